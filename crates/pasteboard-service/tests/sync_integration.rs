//! Integration tests for cross-device clipboard sync.
//!
//! # Purpose
//!
//! Two complete daemons ("Desk" and "Laptop") run in one process and talk
//! over real loopback TCP: change events are pushed over the peer link and
//! payloads are pulled on first read.  These tests verify:
//!
//! - A copy on one device becomes readable on the other, marked remote.
//! - Delayed entries are resolved on demand through the producer's getter
//!   on the source device.
//! - Local-only payloads, cleared clipboards and the distribution switch
//!   all keep data from crossing.
//!
//! ```text
//! Desk                                   Laptop
//! ────                                   ──────
//! set_paste_data ──► PublishEvent ─────► inbox
//!                                        get_paste_data
//! serve_peer_event ◄── FetchEvent ────── (first read pulls the payload)
//! serve_peer_entry ◄── FetchEntry ────── (delayed entries, on demand)
//! ```

mod common;

use common::{config, eventually, pair, pair_with, CALLER};
use pasteboard_core::model::mime::utd;
use pasteboard_core::{EntryValue, PasteData, PasteRecord, ShareOption};
use pasteboard_service::application::delay::{delay_getter_channel, DelayRequest};
use pasteboard_service::application::ports::SyncBackend;

const USER: u32 = 100;

// ── Happy path ────────────────────────────────────────────────────────────────

/// A plain-text copy on Desk is readable on Laptop after the event arrives.
#[tokio::test]
async fn test_copy_on_desk_is_pasted_on_laptop() {
    // Arrange
    let (desk, laptop) = pair().await;
    desk.assembly
        .service
        .set_paste_data(CALLER, PasteData::with_text("hello laptop"), None)
        .await
        .unwrap();
    let inbox = &laptop.assembly.sync;
    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_some() }).await);

    // Act
    let read = laptop.assembly.service.get_paste_data(CALLER).await.unwrap();

    // Assert
    assert_eq!(read.primary_text(), Some("hello laptop"));
    assert!(read.is_remote());
    let service = &laptop.assembly.service;
    assert_eq!(service.is_remote_data(CALLER), Ok(true));
    assert_eq!(service.get_remote_device_name(CALLER), Ok("Desk".to_string()));
    assert_eq!(service.get_change_count(CALLER), Ok(1));
}

/// Reading twice pulls the payload once.
#[tokio::test]
async fn test_second_read_does_not_pull_again() {
    let (desk, laptop) = pair().await;
    desk.assembly
        .service
        .set_paste_data(CALLER, PasteData::with_text("once"), None)
        .await
        .unwrap();
    let inbox = &laptop.assembly.sync;
    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_some() }).await);

    laptop.assembly.service.get_paste_data(CALLER).await.unwrap();
    laptop.assembly.service.get_paste_data(CALLER).await.unwrap();

    assert_eq!(laptop.assembly.service.get_change_count(CALLER), Ok(1));
}

/// A delayed record is materialised by Desk's producer when Laptop reads it.
#[tokio::test]
async fn test_delayed_entry_resolves_through_source_device() {
    // Arrange
    let (desk, laptop) = pair().await;
    let (getter, mut requests) = delay_getter_channel(4);
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            if let DelayRequest::RecordValue { utd_id, reply, .. } = request {
                let _ = reply.send(Ok(EntryValue::Text(format!("lazy {utd_id}"))));
            }
        }
    });
    let mut data = PasteData::new();
    data.add_record(PasteRecord::delayed([utd::PLAIN_TEXT])).unwrap();
    desk.assembly
        .service
        .set_paste_data(CALLER, data, Some(getter))
        .await
        .unwrap();
    let inbox = &laptop.assembly.sync;
    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_some() }).await);

    // Act
    let read = laptop.assembly.service.get_paste_data(CALLER).await.unwrap();

    // Assert
    assert_eq!(read.primary_text(), Some("lazy general.plain-text"));
}

// ── Data that must not cross ──────────────────────────────────────────────────

/// Switching to a local-only payload withdraws the earlier announcement.
#[tokio::test]
async fn test_local_only_copy_withdraws_announcement() {
    // Arrange
    let (desk, laptop) = pair().await;
    let service = &desk.assembly.service;
    service
        .set_paste_data(CALLER, PasteData::with_text("shared"), None)
        .await
        .unwrap();
    let inbox = &laptop.assembly.sync;
    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_some() }).await);

    // Act
    let mut private = PasteData::with_text("private");
    private.set_share_option(ShareOption::LocalDevice);
    service.set_paste_data(CALLER, private, None).await.unwrap();

    // Assert
    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_none() }).await);
    assert!(!laptop.assembly.service.has_paste_data(CALLER).await);
}

/// Clearing on Desk removes its event from Laptop's inbox.
#[tokio::test]
async fn test_clear_withdraws_announcement() {
    let (desk, laptop) = pair().await;
    desk.assembly
        .service
        .set_paste_data(CALLER, PasteData::with_text("gone soon"), None)
        .await
        .unwrap();
    let inbox = &laptop.assembly.sync;
    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_some() }).await);

    desk.assembly.service.clear(CALLER).await.unwrap();

    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_none() }).await);
}

/// A device with distribution disabled ignores peer payloads.
#[tokio::test]
async fn test_disallowed_device_ignores_remote_payloads() {
    // Arrange
    let mut laptop_cfg = config("net-b", "Laptop");
    laptop_cfg.remote.disallow_distributed = true;
    let (desk, laptop) = pair_with(config("net-a", "Desk"), laptop_cfg).await;
    desk.assembly
        .service
        .set_paste_data(CALLER, PasteData::with_text("blocked"), None)
        .await
        .unwrap();
    let inbox = &laptop.assembly.sync;
    assert!(eventually(|| async move { inbox.latest_event(USER).await.is_some() }).await);

    // Act
    let has = laptop.assembly.service.has_paste_data(CALLER).await;

    // Assert
    assert!(!has);
    assert_eq!(laptop.assembly.service.get_change_count(CALLER), Ok(0));
}
