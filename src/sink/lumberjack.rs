//! Lumberjack v1 wire protocol client.
//!
//! A client owns one TCP (optionally TLS) connection and a per-connection
//! sequence counter. `send` frames a window header, a zlib-compressed run
//! of data frames, and waits for the server's 6-byte acknowledgement. Any
//! failure drops the connection; the next send reconnects with the
//! sequence counter back at zero.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rustls_pki_types::ServerName;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use crate::error::{
    ConnectTimeoutSnafu, InvalidServerNameSnafu, SendError, SendTimeoutSnafu, SerializeSnafu,
};
use crate::sink::Sender;
use crate::types::Record;

use snafu::prelude::*;

/// `"1W"` + window size.
const WINDOW_MARKER: &[u8] = b"1W";
/// `"1C"` + compressed payload length.
const COMPRESSED_MARKER: &[u8] = b"1C";
/// `"1D"` + sequence + key count, inside the compressed payload.
const DATA_MARKER: &[u8] = b"1D";

/// The server acknowledges a window with exactly 6 bytes. Mirroring
/// logstash-forwarder, the content is not inspected.
const ACK_LEN: usize = 6;

/// Connection settings for a lumberjack endpoint.
#[derive(Debug, Clone)]
pub struct LumberjackOptions {
    /// `host:port` of the endpoint.
    pub address: String,

    /// TLS server name; the host portion of `address` is used when absent.
    pub server_name: Option<String>,

    /// TLS client configuration; plain TCP when absent.
    pub tls: Option<Arc<ClientConfig>>,

    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,

    /// Deadline for the handshake and for each whole send (writes + ACK).
    pub send_timeout: Duration,
}

enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Connection::Plain(stream) => stream.write_all(buf).await,
            Connection::Tls(stream) => stream.write_all(buf).await,
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        match self {
            Connection::Plain(stream) => stream.read_exact(buf).await.map(|_| ()),
            Connection::Tls(stream) => stream.read_exact(buf).await.map(|_| ()),
        }
    }
}

/// Client for one lumberjack endpoint. Connects lazily and reconnects on
/// the send after a failure.
pub struct LumberjackSender {
    options: LumberjackOptions,
    connection: Option<Connection>,
    sequence: u32,
}

impl LumberjackSender {
    pub fn new(options: LumberjackOptions) -> Self {
        Self {
            options,
            connection: None,
            sequence: 0,
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), SendError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let address = self.options.address.clone();
        let stream = match tokio::time::timeout(
            self.options.connect_timeout,
            TcpStream::connect(&address),
        )
        .await
        {
            Err(_) => return ConnectTimeoutSnafu { address }.fail(),
            Ok(Err(source)) => return Err(SendError::Connect { address, source }),
            Ok(Ok(stream)) => stream,
        };

        let connection = match &self.options.tls {
            Some(config) => {
                let server_name = self.server_name()?;
                let connector = TlsConnector::from(Arc::clone(config));
                match tokio::time::timeout(
                    self.options.send_timeout,
                    connector.connect(server_name, stream),
                )
                .await
                {
                    Err(_) => return SendTimeoutSnafu { address }.fail(),
                    Ok(Err(source)) => return Err(SendError::Handshake { address, source }),
                    Ok(Ok(tls)) => Connection::Tls(Box::new(tls)),
                }
            }
            None => Connection::Plain(stream),
        };

        self.connection = Some(connection);
        Ok(())
    }

    fn server_name(&self) -> Result<ServerName<'static>, SendError> {
        let name = match &self.options.server_name {
            Some(name) => name.clone(),
            None => self
                .options
                .address
                .split(':')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        ServerName::try_from(name.clone())
            .ok()
            .context(InvalidServerNameSnafu { name })
    }

    fn disconnect(&mut self) {
        self.connection = None;
        self.sequence = 0;
    }
}

#[async_trait]
impl Sender for LumberjackSender {
    fn name(&self) -> &str {
        &self.options.address
    }

    async fn send(&mut self, records: &[Record]) -> Result<(), SendError> {
        self.ensure_connected().await?;

        let payload = serialize_payload(&mut self.sequence, records).context(SerializeSnafu)?;
        let header = encode_header(records.len() as u32, payload.len() as u32);
        let address = self.options.address.clone();

        let Some(connection) = self.connection.as_mut() else {
            return ConnectTimeoutSnafu { address }.fail();
        };

        let result = tokio::time::timeout(self.options.send_timeout, async {
            connection.write_all(&header).await?;
            connection.write_all(&payload).await?;

            let mut ack = [0u8; ACK_LEN];
            connection.read_exact(&mut ack).await?;
            Ok::<_, io::Error>(())
        })
        .await;

        match result {
            Err(_) => {
                self.disconnect();
                SendTimeoutSnafu { address }.fail()
            }
            Ok(Err(source)) => {
                self.disconnect();
                Err(SendError::Wire { address, source })
            }
            Ok(Ok(())) => Ok(()),
        }
    }
}

/// Build the uncompressed window header: `1W` + record count, `1C` +
/// compressed payload length, both big-endian u32.
fn encode_header(window_size: u32, payload_len: u32) -> BytesMut {
    let mut header = BytesMut::with_capacity(12);
    header.put_slice(WINDOW_MARKER);
    header.put_u32(window_size);
    header.put_slice(COMPRESSED_MARKER);
    header.put_u32(payload_len);
    header
}

/// zlib-compress the records as a run of `1D` data frames, advancing the
/// sequence counter before each record.
fn serialize_payload(sequence: &mut u32, records: &[Record]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());

    for record in records {
        *sequence = sequence.wrapping_add(1);

        encoder.write_all(DATA_MARKER)?;
        encoder.write_all(&sequence.to_be_bytes())?;
        encoder.write_all(&(record.fields.len() as u32).to_be_bytes())?;

        for (key, value) in &record.fields {
            encoder.write_all(&(key.len() as u32).to_be_bytes())?;
            encoder.write_all(key.as_bytes())?;
            encoder.write_all(&(value.len() as u32).to_be_bytes())?;
            encoder.write_all(value.as_bytes())?;
        }
    }

    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::collections::HashMap;
    use std::io::Read;
    use std::path::Path;

    fn read_u32(reader: &mut impl Read) -> u32 {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        u32::from_be_bytes(buf)
    }

    fn read_marker(reader: &mut impl Read) -> [u8; 2] {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        buf
    }

    fn read_string(reader: &mut impl Read) -> String {
        let len = read_u32(reader) as usize;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn record(line: &str) -> Record {
        let mut extra = HashMap::new();
        extra.insert("field1".to_string(), "value1".to_string());
        Record::from_line(line, Path::new("/tmp/a.log"), 6, "test-host", &extra)
    }

    #[test]
    fn header_layout() {
        let header = encode_header(1, 0x0102);
        assert_eq!(
            header.as_ref(),
            [b'1', b'W', 0, 0, 0, 1, b'1', b'C', 0, 0, 1, 2]
        );
    }

    #[test]
    fn payload_roundtrips_through_zlib() {
        let records = vec![record("line1"), record("line2")];
        let mut sequence = 0;
        let payload = serialize_payload(&mut sequence, &records).unwrap();
        assert_eq!(sequence, 2);

        let mut decoder = ZlibDecoder::new(payload.as_slice());

        for (i, record) in records.iter().enumerate() {
            assert_eq!(&read_marker(&mut decoder), b"1D");
            assert_eq!(read_u32(&mut decoder), i as u32 + 1);

            let key_count = read_u32(&mut decoder) as usize;
            assert_eq!(key_count, record.fields.len());

            let mut fields = HashMap::new();
            for _ in 0..key_count {
                let key = read_string(&mut decoder);
                let value = read_string(&mut decoder);
                fields.insert(key, value);
            }
            assert_eq!(&fields, &record.fields);
        }

        // Nothing after the last frame.
        let mut rest = Vec::new();
        decoder.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn sequence_continues_across_sends() {
        let mut sequence = 0;
        serialize_payload(&mut sequence, &[record("line1")]).unwrap();
        serialize_payload(&mut sequence, &[record("line2"), record("line3")]).unwrap();
        assert_eq!(sequence, 3);
    }

    #[test]
    fn lengths_are_utf8_byte_counts() {
        let mut extra = HashMap::new();
        extra.insert("käse".to_string(), "smörgås".to_string());
        let record = Record::from_line("ü", Path::new("/tmp/a.log"), 3, "h", &extra);

        let mut sequence = 0;
        let payload = serialize_payload(&mut sequence, &[record]).unwrap();
        let mut decoder = ZlibDecoder::new(payload.as_slice());

        assert_eq!(&read_marker(&mut decoder), b"1D");
        read_u32(&mut decoder); // sequence
        let key_count = read_u32(&mut decoder);
        assert_eq!(key_count, 3);

        let mut fields = HashMap::new();
        for _ in 0..key_count {
            let key = read_string(&mut decoder);
            let value = read_string(&mut decoder);
            fields.insert(key, value);
        }
        assert_eq!(fields["käse"], "smörgås");
        assert_eq!(fields["line"], "ü");
    }
}
