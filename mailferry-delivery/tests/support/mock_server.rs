//! A scripted SMTP server for exercising delivery scenarios: configurable
//! per-step replies and a record of every command received.

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};

/// A command observed by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCommand {
    Ehlo(String),
    Helo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// The message content between DATA and the terminating dot, verbatim
    /// (dot-stuffing included).
    Message(Vec<u8>),
    Quit,
    Other(String),
}

#[derive(Clone)]
struct Script {
    greeting: (u16, String),
    ehlo: Option<(u16, Vec<String>)>,
    mail_from: (u16, String),
    rcpt_to: (u16, String),
    data: (u16, String),
    data_end: (u16, String),
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: (220, "mock SMTP server ready".to_string()),
            ehlo: Some((250, vec!["mock".to_string(), "SIZE 10240000".to_string()])),
            mail_from: (250, "ok".to_string()),
            rcpt_to: (250, "ok".to_string()),
            data: (354, "start mail input".to_string()),
            data_end: (250, "ok message accepted".to_string()),
        }
    }
}

pub struct MockServerBuilder {
    script: Script,
}

impl MockServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, text: &str) -> Self {
        self.script.greeting = (code, text.to_string());
        self
    }

    /// Makes EHLO fail with `code`, forcing the legacy HELO fallback.
    #[must_use]
    pub fn with_ehlo_failure(mut self, code: u16) -> Self {
        self.script.ehlo = Some((code, vec!["command not implemented".to_string()]));
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, text: &str) -> Self {
        self.script.mail_from = (code, text.to_string());
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, text: &str) -> Self {
        self.script.rcpt_to = (code, text.to_string());
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, text: &str) -> Self {
        self.script.data_end = (code, text.to_string());
        self
    }

    pub async fn build(self) -> MockSmtpServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));

        let script = self.script;
        let recorded = Arc::clone(&commands);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let script = script.clone();
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, script, recorded).await;
                });
            }
        });

        MockSmtpServer { addr, commands }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<MockCommand>>>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder {
            script: Script::default(),
        }
    }

    pub async fn start() -> Self {
        Self::builder().build().await
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<MockCommand> {
        self.commands.lock().await.clone()
    }

    pub async fn received_message(&self) -> Option<Vec<u8>> {
        self.commands.lock().await.iter().find_map(|command| {
            if let MockCommand::Message(bytes) = command {
                Some(bytes.clone())
            } else {
                None
            }
        })
    }
}

async fn serve_connection(
    stream: TcpStream,
    script: Script,
    recorded: Arc<Mutex<Vec<MockCommand>>>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let (code, text) = &script.greeting;
    write.write_all(format!("{code} {text}\r\n").as_bytes()).await?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
        let upper = trimmed.to_uppercase();

        if let Some(host) = upper.strip_prefix("EHLO ") {
            recorded.lock().await.push(MockCommand::Ehlo(host.to_string()));
            if let Some((code, lines)) = &script.ehlo {
                if (200..300).contains(code) {
                    for (i, capability) in lines.iter().enumerate() {
                        let sep = if i + 1 == lines.len() { ' ' } else { '-' };
                        write
                            .write_all(format!("{code}{sep}{capability}\r\n").as_bytes())
                            .await?;
                    }
                } else {
                    write.write_all(format!("{code} no\r\n").as_bytes()).await?;
                }
            }
        } else if let Some(host) = upper.strip_prefix("HELO ") {
            recorded.lock().await.push(MockCommand::Helo(host.to_string()));
            write.write_all(b"250 ok\r\n").await?;
        } else if upper.starts_with("MAIL FROM:") {
            recorded
                .lock()
                .await
                .push(MockCommand::MailFrom(trimmed[10..].trim().to_string()));
            let (code, text) = &script.mail_from;
            write.write_all(format!("{code} {text}\r\n").as_bytes()).await?;
        } else if upper.starts_with("RCPT TO:") {
            recorded
                .lock()
                .await
                .push(MockCommand::RcptTo(trimmed[8..].trim().to_string()));
            let (code, text) = &script.rcpt_to;
            write.write_all(format!("{code} {text}\r\n").as_bytes()).await?;
        } else if upper == "DATA" {
            recorded.lock().await.push(MockCommand::Data);
            let (code, text) = &script.data;
            write.write_all(format!("{code} {text}\r\n").as_bytes()).await?;

            let mut content = Vec::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                if line == ".\r\n" || line == ".\n" {
                    break;
                }
                content.extend_from_slice(line.as_bytes());
            }
            recorded.lock().await.push(MockCommand::Message(content));
            let (code, text) = &script.data_end;
            write.write_all(format!("{code} {text}\r\n").as_bytes()).await?;
        } else if upper == "QUIT" {
            recorded.lock().await.push(MockCommand::Quit);
            write.write_all(b"221 bye\r\n").await?;
            return Ok(());
        } else {
            recorded.lock().await.push(MockCommand::Other(trimmed));
            write.write_all(b"500 unrecognized\r\n").await?;
        }
    }
}
