use crate::core::error::{DecodeError, ErrorCode};
use crate::core::state::AppState;
use crate::handlers::dispatch;
use crate::protocol::{Request, Response, MAX_FRAME_LEN};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Serve one request on `stream`, then close it.
///
/// Reads a single frame of at most [`MAX_FRAME_LEN`] bytes and writes at most
/// one reply. Malformed frames and unknown opcodes get no reply; a frame
/// whose text fields are not UTF-8 gets a request failure. The stream is
/// closed on every exit path when it is dropped.
pub async fn handle_connection<S>(state: Arc<AppState>, mut stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; MAX_FRAME_LEN];
    let len = match stream.read(&mut buf).await {
        Ok(0) => {
            debug!("Client closed the connection before sending a frame");
            return;
        }
        Ok(len) => len,
        Err(e) => {
            debug!(error = %e, "Failed to read frame");
            return;
        }
    };
    let frame = &buf[..len];

    if !state.backend.is_connected() {
        warn!("Persistence backend unavailable, rejecting request");
        write_reply(&mut stream, Response::Failure(ErrorCode::BackendUnavailable)).await;
        return;
    }

    let request = match Request::decode(frame) {
        Ok(request) => request,
        Err(e @ DecodeError::InvalidUtf8(_)) => {
            // Well-framed but unusable text field: the request fails, it is not noise
            warn!(opcode = frame[0], error = %e, "Rejecting frame with non-UTF-8 text");
            write_reply(&mut stream, Response::Failure(ErrorCode::Request)).await;
            return;
        }
        Err(e) => {
            warn!(opcode = frame[0], frame_len = len, error = %e, "Dropping undecodable frame");
            return;
        }
    };

    let opcode = request.opcode();
    let is_shutdown = matches!(request, Request::Shutdown { .. });

    let response = match dispatch(&state, request).await {
        Ok(response) => response,
        Err(failure) => {
            warn!(opcode = ?opcode, error = %failure, "Request failed");
            Response::Failure(failure.code)
        }
    };

    let delivered = write_reply(&mut stream, response).await;

    // The requester sees success before the acceptor is told to stop
    if is_shutdown && delivered && response == Response::Ok {
        info!("Shutdown requested by client");
        state.shutdown.trigger();
    }

    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to close stream");
    }
}

/// Best-effort write; failures are logged and never retried
async fn write_reply<S>(stream: &mut S, response: Response) -> bool
where
    S: AsyncWrite + Unpin,
{
    let bytes = response.to_bytes();
    let result = async {
        stream.write_all(&bytes).await?;
        stream.flush().await
    }
    .await;

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, reply = ?response, "Failed to write reply");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::models::token::Token;
    use crate::stores::{Backend, MemoryBackend};
    use crate::utils::time::current_timestamp;
    use std::time::Duration;
    use tokio::io::duplex;

    const ROOT: Token = Token::new(7);

    async fn setup() -> (Arc<MemoryBackend>, Arc<AppState>) {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_user("root", &[0xAA], Role::Superuser).await.unwrap();
        let now = current_timestamp();
        backend.create_session("root", ROOT, now, now + 900).await.unwrap();

        let state = Arc::new(AppState::new(backend.clone(), Duration::from_secs(900)));
        (backend, state)
    }

    /// Send one frame through an in-memory stream and collect the reply
    async fn exchange(state: &Arc<AppState>, frame: &[u8]) -> Vec<u8> {
        let (mut client, server) = duplex(MAX_FRAME_LEN * 2);
        let handler = tokio::spawn(handle_connection(Arc::clone(state), server));

        client.write_all(frame).await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        handler.await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_hello() {
        let (_, state) = setup().await;
        assert_eq!(exchange(&state, &[0xAA]).await, vec![0x0F, 0x00]);
    }

    #[tokio::test]
    async fn test_unknown_opcode_gets_no_reply() {
        let (_, state) = setup().await;
        assert!(exchange(&state, &[0x99, 0x01, 0x02]).await.is_empty());
    }

    #[tokio::test]
    async fn test_overrunning_length_gets_no_reply() {
        let (backend, state) = setup().await;
        // CreateUser whose username claims 200 bytes
        let frame = [0x10, 0x07, 0x00, 0x00, 0x00, 0x11, 0xC8, b'a'];
        assert!(exchange(&state, &frame).await.is_empty());
        assert_eq!(backend.user_count(), 1);
    }

    #[tokio::test]
    async fn test_non_utf8_username_is_a_request_failure() {
        let (_, state) = setup().await;
        assert_eq!(exchange(&state, &[0x20, 0x02, 0xFF, 0xFE, 0x00]).await, vec![0xF0, 0x02]);
    }

    #[tokio::test]
    async fn test_non_utf8_role_name_changes_nothing() {
        let (backend, state) = setup().await;
        backend.insert_user("alice", &[0x01], Role::User).await.unwrap();

        let mut frame = vec![0x13];
        frame.extend_from_slice(&ROOT.to_le_bytes());
        frame.extend_from_slice(&[0x05, b'a', b'l', b'i', b'c', b'e', 0x02, 0xC3, 0x28]);
        assert_eq!(exchange(&state, &frame).await, vec![0xF0, 0x02]);
        assert_eq!(backend.find_user("alice").await.unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn test_backend_unavailable_overrides_dispatch() {
        let (backend, state) = setup().await;
        backend.disconnect();

        assert_eq!(exchange(&state, &[0xAA]).await, vec![0xF0, 0x01]);
        // Even frames that would not decode
        assert_eq!(exchange(&state, &[0x99]).await, vec![0xF0, 0x01]);
    }

    #[tokio::test]
    async fn test_failure_reply_carries_detail_code() {
        let (_, state) = setup().await;
        let frame = Request::Logout { token: Token::new(12345) }.encode();
        assert_eq!(exchange(&state, &frame).await, vec![0xF0, 0x02]);
    }

    #[tokio::test]
    async fn test_authenticate_reply_layout() {
        let (backend, state) = setup().await;
        backend.insert_user("alice", &[0xDE, 0xAD], Role::User).await.unwrap();

        let frame = Request::Authenticate {
            username: "alice".to_string(),
            digest: vec![0xDE, 0xAD],
        }
        .encode();
        let reply = exchange(&state, &frame).await;

        assert_eq!(reply.len(), 7);
        assert_eq!(&reply[..3], &[0x0F, 0x00, 0x02]);
        let token = Token::from_le_bytes([reply[3], reply[4], reply[5], reply[6]]);
        assert_eq!(backend.user_by_token(token).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_shutdown_replies_then_triggers() {
        let (_, state) = setup().await;

        let frame = Request::Shutdown { token: ROOT }.encode();
        assert_eq!(exchange(&state, &frame).await, vec![0x0F, 0x00]);
        assert!(state.shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_unauthorized_shutdown_leaves_flag_clear() {
        let (_, state) = setup().await;

        let frame = Request::Shutdown { token: Token::new(8) }.encode();
        assert_eq!(exchange(&state, &frame).await, vec![0xF0, 0x03]);
        assert!(!state.shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_client_hangup_before_frame() {
        let (_, state) = setup().await;
        let (client, server) = duplex(64);
        drop(client);

        handle_connection(state, server).await;
    }
}
