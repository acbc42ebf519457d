//! Byte-stream connectors for ELM327 adapters

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional byte stream an ELM327 can sit behind
pub trait AdapterStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AdapterStream for T {}

/// Opens the raw stream for a session
#[async_trait]
pub trait Connector: Send + Sync {
    /// Endpoint identifier used for the lease
    fn endpoint(&self) -> String;

    async fn open(&self) -> io::Result<Box<dyn AdapterStream>>;
}

/// ELM327 WiFi adapter over TCP
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn open(&self) -> io::Result<Box<dyn AdapterStream>> {
        let stream = tokio::net::TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Serial or RFCOMM character device
#[cfg(feature = "serial")]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
}

#[cfg(feature = "serial")]
impl SerialConnector {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl Connector for SerialConnector {
    fn endpoint(&self) -> String {
        self.path.clone()
    }

    async fn open(&self) -> io::Result<Box<dyn AdapterStream>> {
        use tokio_serial::SerialPortBuilderExt;

        // Opened in exclusive mode: a second opener gets EBUSY
        let port = tokio_serial::new(&self.path, self.baud_rate)
            .open_native_async()
            .map_err(io::Error::from)?;
        Ok(Box::new(port))
    }
}
