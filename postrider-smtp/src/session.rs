//! One inbound submission session.
//!
//! A deliberately small ESMTP surface: enough for a local application to
//! hand over mail (HELO/EHLO, MAIL, RCPT, DATA, RSET, NOOP, QUIT), with the
//! queue store deciding acceptance. No inbound TLS or authentication; the
//! listener is meant to sit on a loopback or private interface.

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use postrider_common::{envelope::Envelope, incoming, internal, outgoing};
use postrider_spool::{QueueStore, SpoolError};

use crate::{command::Command, config::ListenerConfig};

pub(crate) struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    store: Arc<QueueStore>,
    hostname: String,
    max_message_size: usize,
    sender: Option<String>,
    recipients: Vec<String>,
}

impl Session {
    pub(crate) fn new(
        stream: TcpStream,
        peer: SocketAddr,
        store: Arc<QueueStore>,
        config: &ListenerConfig,
    ) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
            peer,
            store,
            hostname: config.hostname.clone(),
            max_message_size: config.max_message_size,
            sender: None,
            recipients: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) -> std::io::Result<()> {
        self.reply(&format!("220 {} ESMTP service ready", self.hostname))
            .await?;

        let mut line = Vec::new();
        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line).await? == 0 {
                internal!(level = DEBUG, "Peer {} disconnected", self.peer);
                break;
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            incoming!("{text}");

            match Command::parse(text) {
                Some(Command::Helo(domain)) => {
                    self.reset();
                    self.reply(&format!("250 {} Hello {domain}", self.hostname))
                        .await?;
                }
                Some(Command::Ehlo(domain)) => {
                    self.reset();
                    self.reply(&format!(
                        "250-{} Hello {domain}\r\n250-SIZE {}\r\n250 8BITMIME",
                        self.hostname, self.max_message_size
                    ))
                    .await?;
                }
                Some(Command::MailFrom(address)) => {
                    if self.sender.is_some() {
                        self.reply("503 5.5.1 nested MAIL command").await?;
                    } else {
                        self.sender = Some(address);
                        self.reply("250 2.1.0 OK").await?;
                    }
                }
                Some(Command::RcptTo(address)) => {
                    if self.sender.is_none() {
                        self.reply("503 5.5.1 need MAIL before RCPT").await?;
                    } else {
                        self.recipients.push(address);
                        self.reply("250 2.1.5 OK").await?;
                    }
                }
                Some(Command::Data) => {
                    if self.sender.is_none() || self.recipients.is_empty() {
                        self.reply("503 5.5.1 need RCPT before DATA").await?;
                    } else {
                        self.receive_data().await?;
                    }
                }
                Some(Command::Rset) => {
                    self.reset();
                    self.reply("250 2.0.0 OK").await?;
                }
                Some(Command::Noop) => self.reply("250 2.0.0 OK").await?,
                Some(Command::Quit) => {
                    self.reply("221 2.0.0 Bye").await?;
                    break;
                }
                None => self.reply("500 5.5.2 command not recognised").await?,
            }
        }

        Ok(())
    }

    /// Read the message body up to the lone-dot terminator, undoing dot
    /// stuffing, then hand the completed envelope to the queue.
    async fn receive_data(&mut self) -> std::io::Result<()> {
        self.reply("354 End data with <CR><LF>.<CR><LF>").await?;

        let mut data: Vec<u8> = Vec::new();
        let mut oversized = false;
        let mut line = Vec::new();

        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line).await? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed during DATA",
                ));
            }

            let mut content: &[u8] = &line;
            if let Some(stripped) = content.strip_suffix(b"\n") {
                content = stripped.strip_suffix(b"\r").unwrap_or(stripped);
            }

            if content == b"." {
                break;
            }

            // Undo transparency stuffing
            let content = content.strip_prefix(b".").unwrap_or(content);

            // Keep consuming past the limit so the terminator is still found
            if !oversized {
                if data.len() + content.len() + 2 > self.max_message_size {
                    oversized = true;
                    data.clear();
                } else {
                    data.extend_from_slice(content);
                    data.extend_from_slice(b"\r\n");
                }
            }
        }

        if oversized {
            self.reset();
            return self
                .reply("552 5.3.4 message exceeds maximum allowed size")
                .await;
        }

        let envelope = Envelope::new(
            self.sender.take().unwrap_or_default(),
            std::mem::take(&mut self.recipients),
            data,
        );

        match self.store.enqueue(envelope).await {
            Ok(id) => {
                internal!(level = INFO, "Accepted message {id} from {}", self.peer);
                self.reply(&format!("250 2.0.0 queued as {id}")).await?;
            }
            Err(SpoolError::InvalidEnvelope(err)) => {
                self.reply(&format!("550 5.6.0 {err}")).await?;
            }
            Err(err) => {
                internal!(level = ERROR, "Failed to enqueue message: {err}");
                self.reply("451 4.3.0 temporary failure, try again later")
                    .await?;
            }
        }

        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }

    async fn reply(&mut self, text: &str) -> std::io::Result<()> {
        outgoing!("{text}");
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await
    }
}
