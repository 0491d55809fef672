//! Chrome native messaging framing and the message vocabulary spoken with
//! the extension.
//!
//! Every frame is a 4-byte little-endian length followed by that many bytes
//! of UTF-8 JSON.

use crate::constants::MAX_MESSAGE_SIZE;
use crate::host::Notification;
use crate::models::{ListKind, Preferences, TabId, TabSnapshot};
use crate::pause::HostIdleState;
use crate::policy::IdleEntry;
use crate::store::TimingSnapshot;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "startup")]
    Startup {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
        #[serde(default)]
        tabs: Vec<TabSnapshot>,
    },
    #[serde(rename = "tab_created")]
    TabCreated { tab: TabSnapshot },
    #[serde(rename = "tab_activated")]
    TabActivated {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    #[serde(rename = "tab_removed")]
    TabRemoved {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    #[serde(rename = "tab_updated")]
    TabUpdated {
        tab: TabSnapshot,
        #[serde(rename = "urlChanged", default)]
        url_changed: bool,
    },
    #[serde(rename = "tabs_snapshot")]
    TabsSnapshot { tabs: Vec<TabSnapshot> },
    #[serde(rename = "idle_state")]
    IdleState { state: HostIdleState },
    #[serde(rename = "form_status")]
    FormStatus {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(rename = "hasUnsaved")]
        has_unsaved: bool,
    },
    #[serde(rename = "save_preferences")]
    SavePreferences { preferences: Preferences },
    #[serde(rename = "add_to_list")]
    AddToList { url: String, list: ListKind },
    #[serde(rename = "get_timing_state")]
    GetTimingState,
    #[serde(rename = "get_idle_report")]
    GetIdleReport,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    /// The extension closes the tab after `delay_ms`.
    #[serde(rename = "remove_tab")]
    RemoveTab {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
    #[serde(rename = "notify")]
    Notify(Notification),
    #[serde(rename = "timing_state")]
    TimingState(TimingSnapshot),
    #[serde(rename = "idle_report")]
    IdleReport { entries: Vec<IdleEntry> },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Read one frame body. EOF before the length prefix surfaces as
/// `UnexpectedEof`, which is how the browser signals disconnect.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {len} bytes (max: {MAX_MESSAGE_SIZE} bytes)"),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

pub fn decode(frame: &[u8]) -> serde_json::Result<IncomingMessage> {
    serde_json::from_slice(frame)
}

pub fn write_message<W: Write>(writer: &mut W, message: &OutgoingMessage) -> io::Result<()> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Outgoing message too large: {} bytes", json.len()),
        ));
    }
    let len = u32::try_from(json.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()
}
