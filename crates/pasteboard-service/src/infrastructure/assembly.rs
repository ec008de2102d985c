//! Builds a ready-to-run service from a [`ServiceConfig`].
//!
//! Shared by the daemon binary and by tests that want the real adapters
//! rather than mocks.

use std::sync::Arc;

use crate::application::dispatch::Dispatcher;
use crate::application::ports::{DeviceService, LinkTransport, SyncBackend};
use crate::application::service::{PasteboardService, ServiceDeps};
use crate::infrastructure::collaborators::{
    ConfigBundleService, ConfigTokenService, FocusTracker, StaticDeviceService,
};
use crate::infrastructure::network::peer_link::{PeerLinkServer, TcpLinkTransport};
use crate::infrastructure::network::peer_sync::PeerSyncBackend;
use crate::infrastructure::storage::config::ServiceConfig;

/// Every long-lived component of one daemon instance.
pub struct Assembly {
    pub service: Arc<PasteboardService>,
    pub dispatcher: Arc<Dispatcher>,
    pub peer_server: Arc<PeerLinkServer>,
    pub transport: Arc<TcpLinkTransport>,
    pub sync: Arc<PeerSyncBackend>,
    pub focus: Arc<FocusTracker>,
}

/// Wires the configuration-backed collaborators, the TCP peer link and the
/// peer sync backend into a [`PasteboardService`].
pub fn assemble(config: &ServiceConfig) -> Assembly {
    let device: Arc<dyn DeviceService> = Arc::new(StaticDeviceService::from_config(config));
    let transport = Arc::new(TcpLinkTransport::new(Arc::clone(&device)));
    let sync = Arc::new(PeerSyncBackend::new(Arc::clone(&transport), Arc::clone(&device)));
    let focus = Arc::new(FocusTracker::new());

    let link: Arc<dyn LinkTransport> = Arc::clone(&transport) as Arc<dyn LinkTransport>;
    let backend: Arc<dyn SyncBackend> = Arc::clone(&sync) as Arc<dyn SyncBackend>;
    let deps = ServiceDeps {
        tokens: Arc::new(ConfigTokenService::from_config(config)),
        bundle: Some(Arc::new(ConfigBundleService::new(&config.apps))),
        device,
        ability: Arc::clone(&focus) as _,
        transport: link,
        sync: Some(backend),
    };

    let service = Arc::new(PasteboardService::new(deps, config.service_settings()));
    Assembly {
        dispatcher: Arc::new(Dispatcher::new(Arc::clone(&service))),
        peer_server: Arc::new(PeerLinkServer::new(Arc::clone(&service), Some(Arc::clone(&sync)))),
        service,
        transport,
        sync,
        focus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasteboard_core::{CallerInfo, PasteData};

    #[tokio::test]
    async fn test_assembled_service_round_trips_text_for_unlisted_token() {
        // Arrange
        let assembly = assemble(&ServiceConfig::default());
        let caller = CallerInfo { token_id: 5, pid: 6 };

        // Act
        assembly
            .service
            .set_paste_data(caller, PasteData::with_text("hello"), None)
            .await
            .unwrap();
        let read = assembly.service.get_paste_data(caller).await.unwrap();

        // Assert
        assert_eq!(read.primary_text(), Some("hello"));
        assert_eq!(assembly.service.get_change_count(caller), Ok(1));
    }
}
