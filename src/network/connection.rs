//! Overlay sessions over TCP
//!
//! A session starts with an exchange of signed [`Hello`] frames binding the
//! remote's Ed25519 key (and therefore its overlay identifier) to the
//! endpoints it advertises. After the handshake each direction is a stream
//! of length-prefixed bincode [`Message`] frames: a reader task feeds the
//! router, a writer task drains the peer's bounded outbound queue.
//!
//! The handshake is immediately followed by an initial state exchange, so
//! both sides leave it with a version baseline for the other.

use crate::crypto::{self, Identity};
use crate::error::{Error, Result};
use crate::id::Id;
use crate::network::MAX_FRAME_SIZE;
use crate::overlay::{Overlay, Peer};
use crate::proto::{self, Envelope, Message};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

/// Domain separator for hello signatures
const HELLO_CONTEXT: &[u8] = b"lattica.hello.v1";

/// Handshake frame identifying a node and its reachable endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Hello {
    /// Ed25519 verifying key of the sender
    pub key: [u8; 32],
    /// Endpoints the sender accepts sessions on, as `host:port` strings
    pub endpoints: Vec<String>,
    /// Signature over the context tag, key, and endpoints
    pub signature: Vec<u8>,
}

impl Hello {
    /// Build a signed hello for the local identity
    pub fn sign(identity: &Identity, endpoints: Vec<String>) -> Self {
        let key = identity.verifying_key().to_bytes();
        let signature = identity
            .sign(&Self::message(&key, &endpoints))
            .to_bytes()
            .to_vec();
        Self {
            key,
            endpoints,
            signature,
        }
    }

    /// Validate the hello and return the sender's overlay identifier and
    /// endpoints
    pub fn verify(self) -> Result<(Id, Vec<String>)> {
        let key = VerifyingKey::from_bytes(&self.key)
            .map_err(|_| Error::Handshake("invalid verifying key".into()))?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| Error::Handshake("malformed signature".into()))?;
        if !crypto::verify(&key, &Self::message(&self.key, &self.endpoints), &signature) {
            return Err(Error::Handshake("signature verification failed".into()));
        }
        Ok((crypto::node_id_of(&key), self.endpoints))
    }

    fn message(key: &[u8; 32], endpoints: &[String]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HELLO_CONTEXT.len() + 32 + 16 * endpoints.len());
        buf.extend_from_slice(HELLO_CONTEXT);
        buf.extend_from_slice(key);
        for endpoint in endpoints {
            buf.extend_from_slice(&(endpoint.len() as u32).to_be_bytes());
            buf.extend_from_slice(endpoint.as_bytes());
        }
        buf
    }
}

/// Dial one peer: try its endpoints in order until a session forms
pub(crate) async fn outbound(overlay: Arc<Overlay>, endpoints: Vec<SocketAddr>) {
    for addr in endpoints {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(err) = establish(&overlay, stream).await {
                    tracing::debug!(%addr, %err, "outbound session ended");
                }
                return;
            }
            Err(err) => {
                tracing::debug!(%addr, %err, "dial failed");
            }
        }
    }
}

/// Serve one accepted connection
pub(crate) async fn inbound(overlay: Arc<Overlay>, stream: TcpStream) {
    if let Err(err) = establish(&overlay, stream).await {
        tracing::debug!(%err, "inbound session ended");
    }
}

/// Run the handshake, register the peer, and pump frames until the session
/// dies
async fn establish(overlay: &Arc<Overlay>, stream: TcpStream) -> Result<()> {
    let _ = stream.set_nodelay(true);
    let (mut rd, mut wr) = stream.into_split();

    let hello = Hello::sign(&overlay.identity, overlay.endpoints.read().clone());
    write_frame(&mut wr, &hello).await?;
    let remote: Hello = read_frame(&mut rd).await?;
    let (peer_id, endpoints) = remote.verify()?;

    if peer_id == overlay.node_id() {
        return Err(Error::Handshake("connected to self".into()));
    }

    let (tx, rx) = mpsc::channel(overlay.config.outbound_queue);
    let peer = Arc::new(Peer::new(peer_id, endpoints, tx));
    if !overlay.pool.insert(Arc::clone(&peer)) {
        return Err(Error::Handshake(format!("duplicate session with {}", peer_id)));
    }
    tracing::debug!(peer = %peer_id, "session established");

    let writer = tokio::spawn(write_loop(wr, rx, Arc::clone(&peer)));
    overlay.on_peer_connected(&peer);

    read_loop(overlay, &peer, &mut rd).await;

    overlay.connection_lost(peer_id).await;
    peer.close();
    let _ = writer.await;
    Ok(())
}

/// Feed inbound frames to the router until the stream or session closes
async fn read_loop(overlay: &Arc<Overlay>, peer: &Arc<Peer>, rd: &mut OwnedReadHalf) {
    let mut closed = peer.closed();
    loop {
        tokio::select! {
            frame = read_frame::<_, Message>(rd) => match frame {
                Ok(mut msg) => match Envelope::unpack(&mut msg) {
                    Ok(env) => overlay.route(Some(peer), env, msg).await,
                    Err(err) => {
                        tracing::warn!(peer = %peer.node_id, %err, "malformed envelope, dropping frame");
                    }
                },
                Err(_) => break,
            },
            _ = wait_closed(&mut closed) => break,
        }
    }
}

/// Wait until a peer's close signal flips to true
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow() {
        if closed.changed().await.is_err() {
            break;
        }
    }
}

/// Drain the outbound queue onto the socket
async fn write_loop(mut wr: OwnedWriteHalf, mut rx: mpsc::Receiver<Message>, peer: Arc<Peer>) {
    let mut closed = peer.closed();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if let Err(err) = write_frame(&mut wr, &msg).await {
                        tracing::debug!(peer = %peer.node_id, %err, "send failed");
                        break;
                    }
                }
                None => break,
            },
            _ = wait_closed(&mut closed) => break,
        }
    }
    let _ = wr.shutdown().await;
}

/// Write one length-prefixed bincode frame
async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = proto::encode(value)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(bytes.len(), MAX_FRAME_SIZE));
    }
    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed bincode frame
async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(len, MAX_FRAME_SIZE));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    proto::decode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let msg = Message::new(b"over the wire".to_vec());
        write_frame(&mut client, &msg).await.unwrap();

        let received: Message = read_frame(&mut server).await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn frames_preserve_order() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        for i in 0u8..5 {
            write_frame(&mut client, &Message::new(vec![i])).await.unwrap();
        }
        for i in 0u8..5 {
            let msg: Message = read_frame(&mut server).await.unwrap();
            assert_eq!(msg.data, vec![i]);
        }
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let bogus = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        client.write_all(&bogus).await.unwrap();

        let result: Result<Message> = read_frame(&mut server).await;
        assert!(matches!(result, Err(Error::FrameTooLarge(_, _))));
    }

    #[test]
    fn hello_round_trip() {
        let identity = Identity::from_seed(&[3u8; 32]);
        let endpoints = vec!["198.51.100.7:7100".to_string()];

        let hello = Hello::sign(&identity, endpoints.clone());
        let (id, got) = hello.verify().unwrap();

        assert_eq!(id, identity.node_id());
        assert_eq!(got, endpoints);
    }

    #[test]
    fn tampered_hello_is_rejected() {
        let identity = Identity::from_seed(&[3u8; 32]);
        let mut hello = Hello::sign(&identity, vec!["198.51.100.7:7100".into()]);
        hello.endpoints.push("203.0.113.9:7200".into());

        assert!(hello.verify().is_err());
    }

    #[test]
    fn garbage_key_is_rejected() {
        let identity = Identity::from_seed(&[3u8; 32]);
        let mut hello = Hello::sign(&identity, vec![]);
        hello.key = [0xff; 32];

        assert!(hello.verify().is_err());
    }
}
