//! BLE Transport Boundary
//!
//! The session controller talks to the platform BLE stack through the
//! [`Transport`] trait: scan, open, enumerate services, write, read, close.
//! [`BtleTransport`] is the production implementation on btleplug; tests use
//! a scripted fake ([`testing::FakeTransport`]).

use crate::error::GloveError;
use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// How often the scan loop re-checks the adapter's peripheral cache.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Short scan used to make a statically-configured address visible to the
/// adapter before opening it.
const ADDRESS_SCAN_WINDOW: Duration = Duration::from_secs(2);

/// Hard ceiling on a single connect attempt; BlueZ can otherwise block
/// indefinitely when the device is out of range.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque identity of one peripheral: a platform id (macOS UUID form) or a
/// MAC address, depending on the OS. Immutable once chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a resolved characteristic, scoped to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicRef {
    pub uuid: String,
}

/// Snapshot of one characteristic's identifier and advertised capabilities,
/// taken during connect and discarded on disconnect.
#[derive(Debug, Clone)]
pub struct CharacteristicDescriptor {
    pub uuid: String,
    pub supports_write: bool,
    pub supports_write_without_response: bool,
    pub supports_read: bool,
    pub supports_notify: bool,
}

/// Snapshot of one service and its child characteristics.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub uuid: String,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// The platform BLE stack, reduced to the six operations the session needs.
#[async_trait]
pub trait Transport {
    type Connection: Send + Sync;

    /// Scan for a peripheral advertising `name`. Expiry of the window with no
    /// match is a normal empty result, not an error.
    async fn scan(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<DeviceIdentity>, GloveError>;

    /// Open a connection and discover its services.
    async fn open(&self, identity: &DeviceIdentity) -> Result<Self::Connection, GloveError>;

    /// Snapshot the services and characteristics of an open connection.
    async fn list_services(
        &self,
        connection: &Self::Connection,
    ) -> Result<Vec<ServiceDescriptor>, GloveError>;

    /// Write `payload` to a characteristic, optionally waiting for the
    /// transport-level acknowledgment.
    async fn write(
        &self,
        connection: &Self::Connection,
        target: &CharacteristicRef,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), GloveError>;

    /// Read the current value of a characteristic.
    async fn read(
        &self,
        connection: &Self::Connection,
        target: &CharacteristicRef,
    ) -> Result<Vec<u8>, GloveError>;

    /// Close the connection. Consumes it; no reference may outlive this.
    async fn close(&self, connection: Self::Connection) -> Result<(), GloveError>;
}

/// Production transport over the first available btleplug adapter.
pub struct BtleTransport {
    adapter: Adapter,
}

impl BtleTransport {
    pub async fn new() -> Result<Self, GloveError> {
        let manager = Manager::new().await.map_err(stack_error)?;
        let adapters = manager.adapters().await.map_err(stack_error)?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| GloveError::Bluetooth("no bluetooth adapter found".to_string()))?;
        Ok(Self { adapter })
    }

    /// Look the identity up in the adapter's current peripheral cache.
    async fn find_peripheral(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<Option<Peripheral>, GloveError> {
        for peripheral in self.adapter.peripherals().await.map_err(stack_error)? {
            if peripheral.id().to_string().eq_ignore_ascii_case(identity.as_str())
                || peripheral
                    .address()
                    .to_string()
                    .eq_ignore_ascii_case(identity.as_str())
            {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    fn lookup_characteristic(
        connection: &Peripheral,
        target: &CharacteristicRef,
    ) -> Option<btleplug::api::Characteristic> {
        connection
            .characteristics()
            .into_iter()
            .find(|c| c.uuid.to_string().eq_ignore_ascii_case(&target.uuid))
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Connection = Peripheral;

    async fn scan(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<DeviceIdentity>, GloveError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(stack_error)?;

        let deadline = tokio::time::Instant::now() + timeout;
        let found = 'scan: loop {
            for peripheral in self.adapter.peripherals().await.map_err(stack_error)? {
                if let Ok(Some(props)) = peripheral.properties().await {
                    if props.local_name.as_deref() == Some(name) {
                        break 'scan Some(peripheral);
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("failed to stop scan: {}", e);
        }
        Ok(found.map(|p| DeviceIdentity::new(p.id().to_string())))
    }

    async fn open(&self, identity: &DeviceIdentity) -> Result<Peripheral, GloveError> {
        let mut peripheral = self.find_peripheral(identity).await?;

        // A statically-configured address has usually never been scanned for;
        // a short scan populates the adapter cache so it can be opened.
        if peripheral.is_none() {
            debug!("{} not in adapter cache, scanning briefly", identity);
            self.adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(stack_error)?;
            tokio::time::sleep(ADDRESS_SCAN_WINDOW).await;
            if let Err(e) = self.adapter.stop_scan().await {
                warn!("failed to stop scan: {}", e);
            }
            peripheral = self.find_peripheral(identity).await?;
        }

        let peripheral = peripheral.ok_or_else(|| GloveError::ConnectFailure {
            identity: identity.to_string(),
            detail: "peripheral not visible to the adapter".to_string(),
        })?;

        match tokio::time::timeout(CONNECT_TIMEOUT, peripheral.connect()).await {
            Err(_) => {
                return Err(GloveError::ConnectFailure {
                    identity: identity.to_string(),
                    detail: format!("connect timed out after {} s", CONNECT_TIMEOUT.as_secs()),
                })
            }
            Ok(Err(e)) => {
                return Err(GloveError::ConnectFailure {
                    identity: identity.to_string(),
                    detail: e.to_string(),
                })
            }
            Ok(Ok(())) => {}
        }

        // BlueZ signals connection completion before the remote GATT cache is
        // fully populated; give it a moment before discovery.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        peripheral
            .discover_services()
            .await
            .map_err(|e| GloveError::ConnectFailure {
                identity: identity.to_string(),
                detail: format!("service discovery failed: {}", e),
            })?;

        Ok(peripheral)
    }

    async fn list_services(
        &self,
        connection: &Peripheral,
    ) -> Result<Vec<ServiceDescriptor>, GloveError> {
        Ok(connection
            .services()
            .into_iter()
            .map(|service| ServiceDescriptor {
                uuid: service.uuid.to_string(),
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| CharacteristicDescriptor {
                        uuid: c.uuid.to_string(),
                        supports_write: c.properties.contains(CharPropFlags::WRITE),
                        supports_write_without_response: c
                            .properties
                            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
                        supports_read: c.properties.contains(CharPropFlags::READ),
                        supports_notify: c.properties.contains(CharPropFlags::NOTIFY),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn write(
        &self,
        connection: &Peripheral,
        target: &CharacteristicRef,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), GloveError> {
        let characteristic =
            Self::lookup_characteristic(connection, target).ok_or_else(|| {
                GloveError::WriteFailure {
                    detail: format!("characteristic {} not present on connection", target.uuid),
                }
            })?;
        let mode = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        connection
            .write(&characteristic, payload, mode)
            .await
            .map_err(|e| GloveError::WriteFailure {
                detail: e.to_string(),
            })
    }

    async fn read(
        &self,
        connection: &Peripheral,
        target: &CharacteristicRef,
    ) -> Result<Vec<u8>, GloveError> {
        let characteristic =
            Self::lookup_characteristic(connection, target).ok_or_else(|| {
                GloveError::ReadFailure {
                    detail: format!("characteristic {} not present on connection", target.uuid),
                }
            })?;
        connection
            .read(&characteristic)
            .await
            .map_err(|e| GloveError::ReadFailure {
                detail: e.to_string(),
            })
    }

    async fn close(&self, connection: Peripheral) -> Result<(), GloveError> {
        connection
            .disconnect()
            .await
            .map_err(|e| GloveError::Bluetooth(format!("disconnect failed: {}", e)))
    }
}

fn stack_error(e: btleplug::Error) -> GloveError {
    GloveError::Bluetooth(e.to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for session and replay tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    /// One recorded characteristic write, with the (virtual) instant it
    /// happened at for cadence assertions.
    #[derive(Debug, Clone)]
    pub struct RecordedWrite {
        pub uuid: String,
        pub payload: Vec<u8>,
        pub with_response: bool,
        pub at: tokio::time::Instant,
    }

    #[derive(Debug, Default)]
    pub struct TransportLog {
        pub opens: usize,
        pub closes: usize,
        pub reads: usize,
        pub writes: Vec<RecordedWrite>,
    }

    impl TransportLog {
        pub fn frames(&self) -> Vec<String> {
            self.writes
                .iter()
                .map(|w| String::from_utf8_lossy(&w.payload).into_owned())
                .collect()
        }

        pub fn total_calls(&self) -> usize {
            self.opens + self.closes + self.reads + self.writes.len()
        }
    }

    pub struct FakeTransport {
        pub services: Vec<ServiceDescriptor>,
        pub scan_result: Option<DeviceIdentity>,
        pub read_payload: Vec<u8>,
        pub fail_open: bool,
        pub fail_writes: bool,
        pub log: Arc<Mutex<TransportLog>>,
    }

    impl FakeTransport {
        pub fn new(services: Vec<ServiceDescriptor>) -> Self {
            Self {
                services,
                scan_result: None,
                read_payload: b"OK".to_vec(),
                fail_open: false,
                fail_writes: false,
                log: Arc::new(Mutex::new(TransportLog::default())),
            }
        }

        pub fn characteristic(uuid: &str) -> CharacteristicDescriptor {
            CharacteristicDescriptor {
                uuid: uuid.to_string(),
                supports_write: true,
                supports_write_without_response: true,
                supports_read: true,
                supports_notify: false,
            }
        }

        /// The service layout of the real glove module: a `FFF0` service with
        /// one `FFE1` characteristic serving both directions.
        pub fn glove_services() -> Vec<ServiceDescriptor> {
            vec![ServiceDescriptor {
                uuid: "0000fff0-0000-1000-8000-00805f9b34fb".to_string(),
                characteristics: vec![Self::characteristic(
                    "0000ffe1-0000-1000-8000-00805f9b34fb",
                )],
            }]
        }
    }

    pub struct FakeConnection;

    #[async_trait]
    impl Transport for FakeTransport {
        type Connection = FakeConnection;

        async fn scan(
            &self,
            _name: &str,
            _timeout: Duration,
        ) -> Result<Option<DeviceIdentity>, GloveError> {
            Ok(self.scan_result.clone())
        }

        async fn open(&self, identity: &DeviceIdentity) -> Result<FakeConnection, GloveError> {
            if self.fail_open {
                return Err(GloveError::ConnectFailure {
                    identity: identity.to_string(),
                    detail: "scripted open failure".to_string(),
                });
            }
            self.log.lock().unwrap().opens += 1;
            Ok(FakeConnection)
        }

        async fn list_services(
            &self,
            _connection: &FakeConnection,
        ) -> Result<Vec<ServiceDescriptor>, GloveError> {
            Ok(self.services.clone())
        }

        async fn write(
            &self,
            _connection: &FakeConnection,
            target: &CharacteristicRef,
            payload: &[u8],
            with_response: bool,
        ) -> Result<(), GloveError> {
            if self.fail_writes {
                return Err(GloveError::WriteFailure {
                    detail: "scripted write failure".to_string(),
                });
            }
            self.log.lock().unwrap().writes.push(RecordedWrite {
                uuid: target.uuid.clone(),
                payload: payload.to_vec(),
                with_response,
                at: tokio::time::Instant::now(),
            });
            Ok(())
        }

        async fn read(
            &self,
            _connection: &FakeConnection,
            _target: &CharacteristicRef,
        ) -> Result<Vec<u8>, GloveError> {
            self.log.lock().unwrap().reads += 1;
            Ok(self.read_payload.clone())
        }

        async fn close(&self, _connection: FakeConnection) -> Result<(), GloveError> {
            self.log.lock().unwrap().closes += 1;
            Ok(())
        }
    }
}
