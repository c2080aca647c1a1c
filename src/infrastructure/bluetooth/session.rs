//! Glove Session Controller
//!
//! Owns the connection state machine and the resolved endpoint. The endpoint
//! exists exactly while the session is operational (`Ready`, or `Degraded`
//! when the glove offers no read characteristic); every transition that
//! leaves those states invalidates it.

use crate::domain::command::{self, Command, DecodedResponse, WireFrame};
use crate::error::GloveError;
use crate::infrastructure::bluetooth::resolver::{self, Endpoint};
use crate::infrastructure::bluetooth::transport::{DeviceIdentity, Transport};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Identifiers the session resolves against after connecting.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub service_uuid: String,
    pub write_char_uuid: String,
    pub read_char_uuid: String,
    /// Request transport-level write acknowledgments (slower, reliable).
    pub write_with_response: bool,
}

impl From<&crate::domain::settings::GloveSettings> for SessionConfig {
    fn from(settings: &crate::domain::settings::GloveSettings) -> Self {
        Self {
            service_uuid: settings.service_uuid.clone(),
            write_char_uuid: settings.write_char_uuid.clone(),
            read_char_uuid: settings.read_char_uuid.clone(),
            write_with_response: settings.write_with_response,
        }
    }
}

/// Connection lifecycle of one controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Resolving,
    Ready,
    /// Connected and writable, but a tolerated capability is missing.
    Degraded(String),
    Disconnected,
}

impl SessionState {
    /// True while an endpoint exists and commands may be sent.
    pub fn is_operational(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Degraded(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Resolving => f.write_str("resolving"),
            SessionState::Ready => f.write_str("ready"),
            SessionState::Degraded(reason) => write!(f, "degraded ({})", reason),
            SessionState::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// One logical session with the glove.
///
/// Not reentrant: callers must serialize `connect`/`disconnect` on the same
/// instance. Commands are transmitted in submission order; nothing is
/// coalesced beyond the explicit batch frame.
pub struct GloveSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    connection: Option<T::Connection>,
    endpoint: Option<Endpoint>,
}

impl<T: Transport> GloveSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Idle,
            connection: None,
            endpoint: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_operational(&self) -> bool {
        self.state.is_operational()
    }

    /// Connect to the device and resolve the communication endpoint.
    ///
    /// A failure at any step closes whatever was opened and lands in
    /// `Disconnected`. Calling this while already connected is a no-op.
    pub async fn connect(&mut self, identity: &DeviceIdentity) -> Result<(), GloveError> {
        if self.is_operational() {
            debug!("already connected, ignoring connect request");
            return Ok(());
        }

        info!("connecting to {}", identity);
        self.state = SessionState::Connecting;
        let connection = match self.transport.open(identity).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("connect to {} failed: {}", identity, e);
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        self.state = SessionState::Resolving;
        let resolved = match self.transport.list_services(&connection).await {
            Ok(services) => resolver::resolve_endpoint(
                &services,
                &self.config.service_uuid,
                &self.config.write_char_uuid,
                &self.config.read_char_uuid,
            ),
            Err(e) => Err(e),
        };

        match resolved {
            Ok(endpoint) => {
                self.state = if endpoint.read.is_some() {
                    info!("session ready, endpoint {}", endpoint.write.uuid);
                    SessionState::Ready
                } else {
                    let reason =
                        format!("read characteristic {} not found", self.config.read_char_uuid);
                    warn!("session degraded: {}", reason);
                    SessionState::Degraded(reason)
                };
                self.connection = Some(connection);
                self.endpoint = Some(endpoint);
                Ok(())
            }
            Err(e) => {
                // An open connection with no usable endpoint must not outlive
                // the failure report.
                error!("endpoint resolution failed: {}", e);
                if let Err(close_err) = self.transport.close(connection).await {
                    warn!("closing unusable connection failed: {}", close_err);
                }
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Encode a command and write it to the glove.
    ///
    /// A write failure is reported but does not change session state; a
    /// transient transport hiccup is not a disconnection.
    pub async fn send(&mut self, command: &Command) -> Result<(), GloveError> {
        let frame = command::encode(command)?;
        self.send_frame(&frame).await
    }

    /// Write an already-encoded frame to the glove.
    pub async fn send_frame(&mut self, frame: &WireFrame) -> Result<(), GloveError> {
        let (connection, endpoint) = self.require_endpoint("send")?;
        debug!("sending frame {}", frame);
        if let Err(e) = self
            .transport
            .write(
                connection,
                &endpoint.write,
                frame.as_bytes(),
                self.config.write_with_response,
            )
            .await
        {
            error!("sending {:?} failed: {}", frame.as_str(), e);
            return Err(e);
        }
        Ok(())
    }

    /// Read back whatever the glove reports.
    ///
    /// Returns `Ok(None)` when the session has no read characteristic.
    pub async fn receive(&mut self) -> Result<Option<DecodedResponse>, GloveError> {
        let (connection, endpoint) = self.require_endpoint("receive")?;
        let Some(read) = &endpoint.read else {
            debug!("no read characteristic, nothing to receive");
            return Ok(None);
        };
        let bytes = self.transport.read(connection, read).await.map_err(|e| {
            error!("receive failed: {}", e);
            e
        })?;
        Ok(Some(command::decode(&bytes)))
    }

    /// Close the connection and invalidate the endpoint.
    pub async fn disconnect(&mut self) -> Result<(), GloveError> {
        self.endpoint = None;
        let result = match self.connection.take() {
            Some(connection) => {
                info!("disconnecting");
                self.transport.close(connection).await
            }
            None => {
                debug!("disconnect requested with no open connection");
                Ok(())
            }
        };
        self.state = SessionState::Disconnected;
        result
    }

    fn require_endpoint(
        &self,
        operation: &'static str,
    ) -> Result<(&T::Connection, &Endpoint), GloveError> {
        match (&self.connection, &self.endpoint) {
            (Some(connection), Some(endpoint)) => Ok((connection, endpoint)),
            _ => Err(GloveError::NotReady {
                operation,
                state: self.state.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::transport::testing::FakeTransport;
    use crate::infrastructure::bluetooth::transport::{CharacteristicDescriptor, ServiceDescriptor};
    use std::sync::{Arc, Mutex};

    fn config() -> SessionConfig {
        SessionConfig {
            service_uuid: "FFF0".to_string(),
            write_char_uuid: "0000FFE1-0000-1000-8000-00805F9B34FB".to_string(),
            read_char_uuid: "0000FFE1-0000-1000-8000-00805F9B34FB".to_string(),
            write_with_response: false,
        }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("AA:BB:CC:DD:EE:FF")
    }

    fn session_with(
        transport: FakeTransport,
    ) -> (
        GloveSession<FakeTransport>,
        Arc<Mutex<crate::infrastructure::bluetooth::transport::testing::TransportLog>>,
    ) {
        let log = transport.log.clone();
        (GloveSession::new(transport, config()), log)
    }

    #[tokio::test]
    async fn connect_resolves_endpoint_and_becomes_ready() {
        let (mut session, log) =
            session_with(FakeTransport::new(FakeTransport::glove_services()));
        session.connect(&identity()).await.unwrap();
        assert_eq!(*session.state(), SessionState::Ready);
        assert_eq!(log.lock().unwrap().opens, 1);
    }

    #[tokio::test]
    async fn connect_while_ready_is_a_noop() {
        let (mut session, log) =
            session_with(FakeTransport::new(FakeTransport::glove_services()));
        session.connect(&identity()).await.unwrap();
        session.connect(&identity()).await.unwrap();
        assert_eq!(log.lock().unwrap().opens, 1);
    }

    #[tokio::test]
    async fn transport_connect_failure_lands_in_disconnected() {
        let mut transport = FakeTransport::new(FakeTransport::glove_services());
        transport.fail_open = true;
        let (mut session, log) = session_with(transport);
        let err = session.connect(&identity()).await.unwrap_err();
        assert!(matches!(err, GloveError::ConnectFailure { .. }));
        assert_eq!(*session.state(), SessionState::Disconnected);
        assert_eq!(log.lock().unwrap().closes, 0);
    }

    #[tokio::test]
    async fn resolution_failure_closes_the_connection() {
        let services = vec![ServiceDescriptor {
            uuid: "0000aaaa-0000-1000-8000-00805f9b34fb".to_string(),
            characteristics: vec![FakeTransport::characteristic(
                "0000ffe1-0000-1000-8000-00805f9b34fb",
            )],
        }];
        let (mut session, log) = session_with(FakeTransport::new(services));
        let err = session.connect(&identity()).await.unwrap_err();
        assert!(matches!(err, GloveError::ResolutionFailure { .. }));
        assert_eq!(*session.state(), SessionState::Disconnected);
        // The orphaned connection was actively closed before reporting.
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn missing_read_characteristic_degrades_but_sends() {
        let services = vec![ServiceDescriptor {
            uuid: "0000fff0-0000-1000-8000-00805f9b34fb".to_string(),
            characteristics: vec![CharacteristicDescriptor {
                uuid: "0000beef-0000-1000-8000-00805f9b34fb".to_string(),
                supports_write: true,
                supports_write_without_response: true,
                supports_read: false,
                supports_notify: false,
            }],
        }];
        let mut config = config();
        config.write_char_uuid = "0000BEEF-0000-1000-8000-00805F9B34FB".to_string();
        let transport = FakeTransport::new(services);
        let log = transport.log.clone();
        let mut session = GloveSession::new(transport, config);

        session.connect(&identity()).await.unwrap();
        assert!(matches!(session.state(), SessionState::Degraded(_)));

        session
            .send(&Command::SetServo { index: 0, angle: 90 })
            .await
            .unwrap();
        {
            let log = log.lock().unwrap();
            assert_eq!(log.frames(), vec!["A90$".to_string()]);
            // The write targets the resolved characteristic without waiting
            // for an acknowledgment.
            assert_eq!(log.writes[0].uuid, "0000beef-0000-1000-8000-00805f9b34fb");
            assert!(!log.writes[0].with_response);
        }

        let response = session.receive().await.unwrap();
        assert!(response.is_none());
        assert_eq!(log.lock().unwrap().reads, 0);
    }

    #[tokio::test]
    async fn send_outside_ready_is_rejected_without_transport_calls() {
        let (mut session, log) =
            session_with(FakeTransport::new(FakeTransport::glove_services()));
        let err = session
            .send(&Command::SetServo { index: 0, angle: 10 })
            .await
            .unwrap_err();
        assert!(matches!(err, GloveError::NotReady { .. }));
        assert_eq!(log.lock().unwrap().total_calls(), 0);

        session.connect(&identity()).await.unwrap();
        session.disconnect().await.unwrap();
        let err = session
            .send(&Command::SetServo { index: 0, angle: 10 })
            .await
            .unwrap_err();
        assert!(matches!(err, GloveError::NotReady { .. }));
        // Only the connect/disconnect pair touched the transport.
        assert_eq!(log.lock().unwrap().total_calls(), 2);
    }

    #[tokio::test]
    async fn write_failure_keeps_the_session_ready() {
        let mut transport = FakeTransport::new(FakeTransport::glove_services());
        transport.fail_writes = true;
        let (mut session, _log) = session_with(transport);
        session.connect(&identity()).await.unwrap();

        let err = session.send(&Command::BuzzerOn).await.unwrap_err();
        assert!(matches!(err, GloveError::WriteFailure { .. }));
        assert_eq!(*session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn receive_decodes_device_text() {
        let mut transport = FakeTransport::new(FakeTransport::glove_services());
        transport.read_payload = b"pos:90".to_vec();
        let (mut session, _log) = session_with(transport);
        session.connect(&identity()).await.unwrap();

        let response = session.receive().await.unwrap().unwrap();
        assert_eq!(response.text, "pos:90");
        assert!(!response.lossy);
    }

    #[tokio::test]
    async fn disconnect_invalidates_the_endpoint() {
        let (mut session, log) =
            session_with(FakeTransport::new(FakeTransport::glove_services()));
        session.connect(&identity()).await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(*session.state(), SessionState::Disconnected);
        assert_eq!(log.lock().unwrap().closes, 1);
        assert!(session.receive().await.is_err());
    }
}
