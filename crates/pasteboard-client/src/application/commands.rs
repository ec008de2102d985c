//! Use cases behind the `pbctl` subcommands.
//!
//! Each [`Command`] turns into one or two requests on a [`PasteboardPort`];
//! the result comes back as an [`Output`] that [`render`] prints either as
//! plain text or as JSON.

use pasteboard_core::{PasteData, PasteRecord};
use serde::Serialize;

use super::port::{ClientError, PasteboardPort};

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetText(String),
    SetHtml(String),
    SetUri(String),
    Get,
    Clear,
    /// Any data at all, or data of one MIME type.
    Has { mime_type: Option<String> },
    MimeTypes,
    ChangeCount,
    Source,
    Device,
    IsRemote,
    Ping,
}

/// What came back.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Done,
    Flag(bool),
    Count(u32),
    Text(String),
    Lines(Vec<String>),
    Data(PasteView),
}

/// Printable summary of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasteView {
    pub remote: bool,
    pub records: Vec<RecordView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    pub record_id: u32,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl PasteView {
    pub fn of(data: &PasteData) -> Self {
        Self {
            remote: data.is_remote(),
            records: data
                .records()
                .iter()
                .map(|record| RecordView {
                    record_id: record.record_id(),
                    mime_type: record.mime_type().to_string(),
                    text: record.primary_text().map(str::to_string),
                    html: record.primary_html().map(str::to_string),
                    uri: record.effective_uri().map(str::to_string),
                })
                .collect(),
        }
    }
}

/// Payload written by the `set-*` commands.
pub fn payload_for(command: &Command) -> Option<PasteData> {
    let record = match command {
        Command::SetText(text) => PasteRecord::plain_text(text.as_str()),
        Command::SetHtml(html) => PasteRecord::html(html.as_str()),
        Command::SetUri(uri) => PasteRecord::uri(uri.as_str()),
        _ => return None,
    };
    let mut data = PasteData::new();
    data.add_record(record).ok()?;
    Some(data)
}

/// Runs `command` against the daemon.
///
/// # Errors
///
/// Whatever the port returns for the underlying request.
pub async fn run_command<P>(port: &mut P, command: Command) -> Result<Output, ClientError>
where
    P: PasteboardPort + ?Sized,
{
    if let Some(data) = payload_for(&command) {
        port.set_paste_data(&data).await?;
        return Ok(Output::Done);
    }
    let output = match command {
        Command::Get => Output::Data(PasteView::of(&port.get_paste_data().await?)),
        Command::Clear => {
            port.clear().await?;
            Output::Done
        }
        Command::Has { mime_type: None } => Output::Flag(port.has_paste_data().await?),
        Command::Has {
            mime_type: Some(mime_type),
        } => Output::Flag(port.has_data_type(&mime_type).await?),
        Command::MimeTypes => Output::Lines(port.get_mime_types().await?),
        Command::ChangeCount => Output::Count(port.get_change_count().await?),
        Command::Source => Output::Text(port.get_data_source().await?),
        Command::Device => Output::Text(port.get_remote_device_name().await?),
        Command::IsRemote => Output::Flag(port.is_remote_data().await?),
        Command::Ping => {
            let nonce = u64::from(std::process::id());
            let echoed = port.ping(nonce).await?;
            if echoed != nonce {
                return Err(ClientError::Protocol(format!(
                    "ping answered with {echoed}, expected {nonce}"
                )));
            }
            Output::Text("pong".to_string())
        }
        Command::SetText(_) | Command::SetHtml(_) | Command::SetUri(_) => Output::Done,
    };
    Ok(output)
}

/// Formats `output` for stdout.
///
/// # Errors
///
/// Only JSON serialisation can fail.
pub fn render(output: &Output, json: bool) -> Result<String, serde_json::Error> {
    if json {
        return match output {
            Output::Done => Ok("{}".to_string()),
            Output::Flag(flag) => serde_json::to_string(flag),
            Output::Count(count) => serde_json::to_string(count),
            Output::Text(text) => serde_json::to_string(text),
            Output::Lines(lines) => serde_json::to_string(lines),
            Output::Data(view) => serde_json::to_string_pretty(view),
        };
    }
    let text = match output {
        Output::Done => String::new(),
        Output::Flag(flag) => flag.to_string(),
        Output::Count(count) => count.to_string(),
        Output::Text(text) => text.clone(),
        Output::Lines(lines) => lines.join("\n"),
        Output::Data(view) => view
            .records
            .iter()
            .map(|r| {
                let value = r
                    .text
                    .as_deref()
                    .or(r.html.as_deref())
                    .or(r.uri.as_deref())
                    .unwrap_or("<no inline value>");
                format!("[{}] {}: {}", r.record_id, r.mime_type, value)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };
    Ok(text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
