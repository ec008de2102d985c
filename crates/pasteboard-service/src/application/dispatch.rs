//! Opcode dispatch table for IPC requests.
//!
//! Each request opcode maps to exactly one handler function.  A handler takes
//! the decoded request and returns a typed [`Reply`]; the transport turns the
//! reply (or the error) into wire frames.  There is no proxy/stub hierarchy:
//! adding an opcode means adding one function and one table row.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pasteboard_core::protocol::messages::MessageType;
use pasteboard_core::transfer::{SharedRegion, TransferPayload};
use pasteboard_core::{PasteDataEntry, PasteMessage, PasteResult, PasteboardError, ShareOption};
use tracing::debug;

use super::service::PasteboardService;

/// A decoded request plus the shared region its large payload was spooled
/// into, if any.
#[derive(Debug)]
pub struct Request {
    pub message: PasteMessage,
    pub region: Option<SharedRegion>,
}

impl Request {
    pub fn new(message: PasteMessage) -> Self {
        Self {
            message,
            region: None,
        }
    }

    pub fn with_region(message: PasteMessage, region: SharedRegion) -> Self {
        Self {
            message,
            region: Some(region),
        }
    }
}

/// Typed result of a successful request.
#[derive(Debug)]
pub enum Reply {
    /// Success with nothing to return.
    Done,
    Bool(bool),
    Count(u32),
    Text(String),
    MimeTypes(Vec<String>),
    Entry(PasteDataEntry),
    ShareOptions(Vec<(u32, ShareOption)>),
    PasteData(TransferPayload),
    Pong(u64),
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = PasteResult<Reply>> + Send + 'a>>;
type Handler = for<'a> fn(&'a PasteboardService, Request) -> HandlerFuture<'a>;

/// Routes requests to their handler.
pub struct Dispatcher {
    service: Arc<PasteboardService>,
    handlers: HashMap<MessageType, Handler>,
}

impl Dispatcher {
    pub fn new(service: Arc<PasteboardService>) -> Self {
        let table: [(MessageType, Handler); 18] = [
            (MessageType::SetPasteData, handle_set_paste_data),
            (MessageType::GetPasteData, handle_get_paste_data),
            (MessageType::HasPasteData, handle_has_paste_data),
            (MessageType::HasDataType, handle_has_data_type),
            (MessageType::GetMimeTypes, handle_get_mime_types),
            (MessageType::Clear, handle_clear),
            (MessageType::GetChangeCount, handle_get_change_count),
            (MessageType::IsRemoteData, handle_is_remote_data),
            (MessageType::GetDataSource, handle_get_data_source),
            (MessageType::GetRemoteDeviceName, handle_get_remote_device_name),
            (MessageType::GetRecordValueByType, handle_get_record_value),
            (MessageType::SetGlobalShareOption, handle_set_global_share_option),
            (MessageType::RemoveGlobalShareOption, handle_remove_global_share_option),
            (MessageType::GetGlobalShareOption, handle_get_global_share_option),
            (MessageType::SetAppShareOptions, handle_set_app_share_options),
            (MessageType::RemoveAppShareOptions, handle_remove_app_share_options),
            (MessageType::ShowProgress, handle_show_progress),
            (MessageType::Ping, handle_ping),
        ];
        Self {
            service,
            handlers: table.into_iter().collect(),
        }
    }

    pub fn service(&self) -> &Arc<PasteboardService> {
        &self.service
    }

    /// `true` if `message_type` is an IPC request this table answers.
    pub fn handles(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Runs the handler registered for the request's opcode.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::InvalidParam`] for opcodes without a handler, else
    /// whatever the handler returns.
    pub async fn dispatch(&self, request: Request) -> PasteResult<Reply> {
        let message_type = request.message.message_type();
        let Some(handler) = self.handlers.get(&message_type) else {
            debug!(?message_type, "no handler for opcode");
            return Err(PasteboardError::InvalidParam);
        };
        handler(&self.service, request).await
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

fn handle_set_paste_data(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::SetPasteData(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        let mut region = req.region;
        svc.set_paste_data_from_transfer(m.caller, region.as_mut(), m.declared_size, &m.inline)
            .await?;
        Ok(Reply::Done)
    })
}

fn handle_get_paste_data(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::GetPasteData(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::PasteData(svc.get_paste_data_transfer(caller).await?))
    })
}

fn handle_has_paste_data(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::HasPasteData(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::Bool(svc.has_paste_data(caller).await))
    })
}

fn handle_has_data_type(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::HasDataType(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::Bool(svc.has_data_type(m.caller, &m.mime_type).await))
    })
}

fn handle_get_mime_types(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::GetMimeTypes(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::MimeTypes(svc.get_mime_types(caller).await))
    })
}

fn handle_clear(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::Clear(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        svc.clear(caller).await?;
        Ok(Reply::Done)
    })
}

fn handle_get_change_count(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::GetChangeCount(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::Count(svc.get_change_count(caller)?))
    })
}

fn handle_is_remote_data(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::IsRemoteData(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::Bool(svc.is_remote_data(caller)?))
    })
}

fn handle_get_data_source(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::GetDataSource(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::Text(svc.get_data_source(caller)?))
    })
}

fn handle_get_remote_device_name(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::GetRemoteDeviceName(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::Text(svc.get_remote_device_name(caller)?))
    })
}

fn handle_get_record_value(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::GetRecordValueByType(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        let entry = svc
            .get_record_value_by_type(m.caller, m.data_id, m.record_id, &m.utd_id)
            .await?;
        Ok(Reply::Entry(entry))
    })
}

fn handle_set_global_share_option(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::SetGlobalShareOption(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        svc.set_global_share_options(m.caller, &m.options)?;
        Ok(Reply::Done)
    })
}

fn handle_remove_global_share_option(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::RemoveGlobalShareOption(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        svc.remove_global_share_options(m.caller, &m.tokens)?;
        Ok(Reply::Done)
    })
}

fn handle_get_global_share_option(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::GetGlobalShareOption(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::ShareOptions(svc.get_global_share_options(m.caller, &m.tokens)?))
    })
}

fn handle_set_app_share_options(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::SetAppShareOptions(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        svc.set_app_share_options(m.caller, m.option)?;
        Ok(Reply::Done)
    })
}

fn handle_remove_app_share_options(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::RemoveAppShareOptions(caller) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        svc.remove_app_share_options(caller)?;
        Ok(Reply::Done)
    })
}

fn handle_show_progress(svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::ShowProgress(m) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        svc.show_progress(m.caller, &m.progress_key)?;
        Ok(Reply::Done)
    })
}

fn handle_ping(_svc: &PasteboardService, req: Request) -> HandlerFuture<'_> {
    Box::pin(async move {
        let PasteMessage::Ping(token) = req.message else {
            return Err(PasteboardError::InvalidParam);
        };
        Ok(Reply::Pong(token))
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        MockAbilityService, MockDeviceService, MockLinkTransport, MockTokenService, TokenInfo,
        TokenType,
    };
    use crate::application::service::{ServiceDeps, ServiceSettings};
    use pasteboard_core::model::encode_paste_data;
    use pasteboard_core::protocol::messages::{HasDataTypeRequest, SetPasteDataRequest};
    use pasteboard_core::transfer::receive_transfer;
    use pasteboard_core::{CallerInfo, PasteData};

    const CALLER: CallerInfo = CallerInfo { token_id: 7, pid: 70 };

    fn dispatcher() -> Dispatcher {
        let mut tokens = MockTokenService::new();
        tokens.expect_get_token_info().returning(|_| {
            Some(TokenInfo {
                bundle_name: "com.example.app".into(),
                user_id: 100,
                token_type: TokenType::Hap,
                app_index: 0,
            })
        });
        tokens.expect_verify_token().returning(|_, _| true);
        let mut ability = MockAbilityService::new();
        ability.expect_is_focused_app().returning(|_| false);
        ability.expect_check_ui_extension_is_focused().returning(|_| false);
        let mut device = MockDeviceService::new();
        device.expect_local_network_id().returning(|| "net-a".into());
        let deps = ServiceDeps {
            tokens: Arc::new(tokens),
            bundle: None,
            device: Arc::new(device),
            ability: Arc::new(ability),
            transport: Arc::new(MockLinkTransport::new()),
            sync: None,
        };
        Dispatcher::new(Arc::new(PasteboardService::new(deps, ServiceSettings::default())))
    }

    #[tokio::test]
    async fn test_set_then_get_through_table() {
        // Arrange
        let dispatcher = dispatcher();
        let bytes = encode_paste_data(&PasteData::with_text("via table"));
        let set = PasteMessage::SetPasteData(SetPasteDataRequest {
            caller: CALLER,
            declared_size: bytes.len() as i64,
            inline: bytes,
        });

        // Act
        let set_reply = dispatcher.dispatch(Request::new(set)).await.unwrap();
        let get_reply = dispatcher
            .dispatch(Request::new(PasteMessage::GetPasteData(CALLER)))
            .await
            .unwrap();

        // Assert
        assert!(matches!(set_reply, Reply::Done));
        let Reply::PasteData(payload) = get_reply else {
            panic!("expected a paste data reply");
        };
        let (data, has_data) = receive_transfer(payload).unwrap();
        assert!(has_data);
        assert_eq!(data.primary_text(), Some("via table"));
    }

    #[tokio::test]
    async fn test_declared_size_mismatch_is_reported() {
        let dispatcher = dispatcher();
        let set = PasteMessage::SetPasteData(SetPasteDataRequest {
            caller: CALLER,
            declared_size: 10,
            inline: vec![0; 4],
        });

        let result = dispatcher.dispatch(Request::new(set)).await;

        assert_eq!(result.unwrap_err(), PasteboardError::InvalidDataSize);
    }

    #[tokio::test]
    async fn test_query_handlers_answer_with_typed_replies() {
        let dispatcher = dispatcher();
        let has_type = PasteMessage::HasDataType(HasDataTypeRequest {
            caller: CALLER,
            mime_type: "text/plain".into(),
        });

        let reply = dispatcher.dispatch(Request::new(has_type)).await.unwrap();
        let count = dispatcher
            .dispatch(Request::new(PasteMessage::GetChangeCount(CALLER)))
            .await
            .unwrap();

        assert!(matches!(reply, Reply::Bool(false)));
        assert!(matches!(count, Reply::Count(0)));
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_same_token() {
        let dispatcher = dispatcher();
        let reply = dispatcher
            .dispatch(Request::new(PasteMessage::Ping(42)))
            .await
            .unwrap();
        assert!(matches!(reply, Reply::Pong(42)));
    }

    #[tokio::test]
    async fn test_reply_opcodes_have_no_handler() {
        let dispatcher = dispatcher();

        assert!(!dispatcher.handles(MessageType::Status));
        assert!(!dispatcher.handles(MessageType::FetchEvent));
        let result = dispatcher
            .dispatch(Request::new(PasteMessage::Status(0)))
            .await;
        assert_eq!(result.unwrap_err(), PasteboardError::InvalidParam);
    }
}
