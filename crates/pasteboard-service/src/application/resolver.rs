//! Delay/remote resolution engine.
//!
//! Materialises entries that were copied without a value.  Resolution always
//! works on the *reader's* copy of the payload; the stored payload is never
//! touched.
//!
//! ```text
//! entry resolved ─────────────────────────────► return
//! unresolved, local payload ──► delay getter RPC ──► fill entry
//! unresolved, remote payload ─┬─ html ──► size check ──► fetch ──► rebuild file refs
//!                             ├─ uri  ──► flag/utd check ──► fetch ──► distributed uri
//!                             └─ other ─► fetch ──► copy value
//! ```

use pasteboard_core::model::mime::{self, utd};
use pasteboard_core::protocol::messages::DistributedEvent;
use pasteboard_core::{EntryValue, PasteData, PasteDataProperty, PasteResult, PasteboardError};
use tracing::{debug, warn};

use super::delay::DelayGetterHandle;
use super::remote::RemoteSyncCoordinator;

/// Where a remote payload came from and who is asking.
#[derive(Clone, Copy)]
pub struct RemoteSource<'a> {
    pub coordinator: &'a RemoteSyncCoordinator,
    pub event: &'a DistributedEvent,
    pub pid: u32,
}

/// Everything resolution may call out to.
#[derive(Clone, Copy, Default)]
pub struct ResolveContext<'a> {
    pub delay_getter: Option<&'a DelayGetterHandle>,
    pub remote: Option<RemoteSource<'a>>,
}

/// Resolves one entry of `data` in place.
///
/// # Errors
///
/// - [`PasteboardError::InvalidParam`] if the record does not exist.
/// - [`PasteboardError::GetEntryValueFailed`] if the entry does not exist,
///   no delay getter is available, or the getter fails.
/// - [`PasteboardError::RebuildHtmlFailed`] / [`PasteboardError::RemoteDataFailed`]
///   on the remote HTML / other paths.
pub async fn resolve_entry(
    data: &mut PasteData,
    record_id: u32,
    utd_id: &str,
    ctx: &ResolveContext<'_>,
) -> PasteResult<()> {
    let record = data
        .record_by_id(record_id)
        .ok_or(PasteboardError::InvalidParam)?;
    let entry = record
        .get_entry(utd_id)
        .ok_or(PasteboardError::GetEntryValueFailed)?;
    if !entry.is_unresolved() {
        return Ok(());
    }

    if data.is_remote() {
        let remote = ctx.remote.ok_or(PasteboardError::RemoteDataFailed)?;
        match utd_id {
            utd::HTML => rebuild_html(data, record_id, remote).await,
            utd::FILE_URI => rebuild_uri(data, record_id, utd_id, remote).await,
            _ => copy_remote_entry(data, record_id, utd_id, remote).await,
        }
    } else {
        resolve_local(data, record_id, utd_id, ctx.delay_getter).await
    }
}

/// Resolves every unresolved entry of a basic type (text, HTML, URI).
pub async fn resolve_basic_entries(data: &mut PasteData, ctx: &ResolveContext<'_>) -> PasteResult<()> {
    let pending: Vec<(u32, String)> = data
        .records()
        .iter()
        .flat_map(|r| {
            r.entries()
                .iter()
                .filter(|e| e.is_unresolved() && mime::is_basic_type(e.mime_type()))
                .map(move |e| (r.record_id(), e.utd_id().to_string()))
        })
        .collect();
    for (record_id, utd_id) in pending {
        resolve_entry(data, record_id, &utd_id, ctx).await?;
    }
    Ok(())
}

/// Materialises a whole-payload delay copy through the producer.
///
/// The produced records replace the placeholder while ownership and policy
/// attributes stay those of `stored`.
pub async fn resolve_whole_payload(
    stored: &PasteData,
    getter: Option<&DelayGetterHandle>,
) -> PasteResult<PasteData> {
    let getter = getter.ok_or(PasteboardError::GetEntryValueFailed)?;
    let type_hint = stored.mime_types().into_iter().next().unwrap_or_default();
    let mut produced = if stored.props().is_unified_data {
        getter.get_unified_data(&type_hint).await?
    } else {
        getter.get_paste_data(&type_hint).await?
    };
    if produced.is_empty() {
        warn!("delay getter produced an empty payload");
        return Err(PasteboardError::GetEntryValueFailed);
    }
    produced
        .bind_token(stored.token_id())
        .map_err(|_| PasteboardError::GetEntryValueFailed)?;
    let (bundle_name, app_index) = stored.origin_authority();
    produced.set_origin_authority(bundle_name, app_index);
    *produced.props_mut() = PasteDataProperty {
        is_delay_data: false,
        ..stored.props().clone()
    };
    Ok(produced)
}

async fn resolve_local(
    data: &mut PasteData,
    record_id: u32,
    utd_id: &str,
    getter: Option<&DelayGetterHandle>,
) -> PasteResult<()> {
    let delayed = data.is_delay_data()
        || data
            .record_by_id(record_id)
            .map(|r| r.is_delay_record())
            .unwrap_or(false);
    if !delayed {
        debug!(record_id, utd_id, "unresolved entry without delay flag");
        return Err(PasteboardError::GetEntryValueFailed);
    }
    let Some(getter) = getter else {
        debug!(record_id, utd_id, "no delay getter registered");
        return Err(PasteboardError::GetEntryValueFailed);
    };
    let value = getter.get_record_value(record_id, utd_id).await?;
    if value.is_empty() {
        return Err(PasteboardError::GetEntryValueFailed);
    }
    data.set_entry_value(record_id, utd_id, value);
    Ok(())
}

async fn rebuild_html(data: &mut PasteData, record_id: u32, remote: RemoteSource<'_>) -> PasteResult<()> {
    if data.props().file_size <= 0 {
        warn!(record_id, "remote html declares no file size");
        return Err(PasteboardError::RebuildHtmlFailed);
    }
    let references_files = data
        .record_by_id(record_id)
        .map(|r| r.references_files())
        .unwrap_or(false);

    let mut transient = remote
        .coordinator
        .fetch_remote_entry(remote.event, remote.pid, record_id, utd::HTML)
        .await
        .map_err(|_| PasteboardError::RebuildHtmlFailed)?;
    let mut html = transient
        .record_at(0)
        .and_then(|r| r.get_entry(utd::HTML))
        .and_then(|e| e.as_html())
        .map(str::to_string)
        .ok_or(PasteboardError::RebuildHtmlFailed)?;

    if references_files {
        transient.generate_distributed_uri(&remote.event.device_id);
        for record in transient.records().iter().skip(1) {
            if let (Some(original), Some(converted)) = (record.primary_uri(), record.converted_uri()) {
                html = html.replace(original, converted);
            }
        }
    }
    data.set_entry_value(record_id, utd::HTML, EntryValue::Html(html));
    Ok(())
}

async fn rebuild_uri(
    data: &mut PasteData,
    record_id: u32,
    utd_id: &str,
    remote: RemoteSource<'_>,
) -> PasteResult<()> {
    let delayed = data
        .record_by_id(record_id)
        .map(|r| r.is_delay_record())
        .unwrap_or(false);
    if !delayed || utd_id != utd::FILE_URI {
        debug!(record_id, utd_id, "uri entry is not a delayed file uri");
        return Err(PasteboardError::GetEntryValueFailed);
    }

    let transient = remote
        .coordinator
        .fetch_remote_entry(remote.event, remote.pid, record_id, utd_id)
        .await?;
    let uri = transient
        .record_at(0)
        .and_then(|r| r.get_entry(utd::FILE_URI))
        .and_then(|e| e.as_uri())
        .map(str::to_string)
        .ok_or(PasteboardError::RemoteDataFailed)?;
    data.set_entry_value(record_id, utd::FILE_URI, EntryValue::Uri(uri));
    data.generate_distributed_uri(&remote.event.device_id);
    Ok(())
}

async fn copy_remote_entry(
    data: &mut PasteData,
    record_id: u32,
    utd_id: &str,
    remote: RemoteSource<'_>,
) -> PasteResult<()> {
    let transient = remote
        .coordinator
        .fetch_remote_entry(remote.event, remote.pid, record_id, utd_id)
        .await?;
    let value = transient
        .record_at(0)
        .and_then(|r| r.get_entry(utd_id))
        .map(|e| e.value().clone())
        .filter(|v| !v.is_empty())
        .ok_or(PasteboardError::RemoteDataFailed)?;
    data.set_entry_value(record_id, utd_id, value);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
