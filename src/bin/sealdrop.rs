//! Command-line client: encrypts locally, uploads ciphertext, and turns
//! share links back into plaintext files.

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use sealdrop::custody::{self, IV_LEN};
use sealdrop::models::{BlobResponse, LoginResponse, UploadResponse, UserResponse};

/// sealdrop client
#[derive(Parser, Debug)]
#[command(name = "sealdrop", version, about = "Zero-knowledge encrypted file drop")]
struct Cli {
    /// Server base URL. Downloads default to the share link's origin.
    #[arg(long, env = "SEALDROP_SERVER")]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SEALDROP_PASSWORD")]
        password: String,
    },
    /// Obtain an access token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SEALDROP_PASSWORD")]
        password: String,
    },
    /// Encrypt and upload a file, printing its share link
    Upload {
        file: PathBuf,
        #[arg(long, env = "SEALDROP_TOKEN")]
        token: String,
        /// Lifetime in hours; the server default applies when omitted
        #[arg(long)]
        ttl_hours: Option<u32>,
        /// MIME type recorded for the plaintext
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
        /// Origin used in the share link, defaults to the server URL
        #[arg(long)]
        origin: Option<String>,
    },
    /// Fetch and decrypt a share link
    Download {
        link: String,
        /// Output path, defaults to the uploaded filename in the current directory
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Server response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i32,
    message: String,
    data: Option<T>,
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status();
    let envelope: Envelope<T> = response
        .json()
        .await
        .with_context(|| format!("unexpected response from server ({})", status))?;

    if !status.is_success() || envelope.code != 0 {
        bail!("{} ({})", envelope.message, status);
    }
    envelope
        .data
        .with_context(|| format!("server returned no data: {}", envelope.message))
}

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

fn api(server: &str, path: &str) -> String {
    format!("{}/api/v1{}", server.trim_end_matches('/'), path)
}

/// Keep only the final path component of a server-supplied filename
fn local_file_name(name: &str) -> PathBuf {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download.bin"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let http = reqwest::Client::builder()
        .user_agent(concat!("sealdrop/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let server = cli
        .server
        .clone()
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());

    match cli.command {
        Command::Register { email, password } => {
            let user: UserResponse = read_envelope(
                http.post(api(&server, "/auth/register"))
                    .json(&serde_json::json!({ "email": email, "password": password }))
                    .send()
                    .await?,
            )
            .await?;
            println!("registered {} ({})", user.email, user.id);
        }
        Command::Login { email, password } => {
            let login: LoginResponse = read_envelope(
                http.post(api(&server, "/auth/login"))
                    .json(&serde_json::json!({ "email": email, "password": password }))
                    .send()
                    .await?,
            )
            .await?;
            println!("{}", login.access_token);
        }
        Command::Upload {
            file,
            token,
            ttl_hours,
            mime_type,
            origin,
        } => {
            let plaintext = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("file name is not valid UTF-8")?
                .to_string();

            let key = custody::generate_key();
            let iv = custody::generate_iv();
            let ciphertext = custody::encrypt(&plaintext, &key, &iv)?;

            let mut form = reqwest::multipart::Form::new()
                .text("iv", custody::encode_for_url(&iv))
                .text("filename", filename.clone())
                .text("mime_type", mime_type)
                .part(
                    "file",
                    reqwest::multipart::Part::bytes(ciphertext).file_name(filename),
                );
            if let Some(hours) = ttl_hours {
                form = form.text("ttl_hours", hours.to_string());
            }

            let uploaded: UploadResponse = read_envelope(
                http.post(api(&server, "/files/upload"))
                    .bearer_auth(token)
                    .multipart(form)
                    .send()
                    .await?,
            )
            .await?;

            let origin = origin.unwrap_or_else(|| server.clone());
            println!("{}", custody::share_link(&origin, &uploaded.id, &key));
            eprintln!("expires at {}", uploaded.expiry_at);
        }
        Command::Download { link, output } => {
            let share = custody::parse_share_link(&link)?;
            let server = cli.server.clone().unwrap_or_else(|| share.origin.clone());

            let blob: BlobResponse = read_envelope(
                http.get(api(&server, &format!("/public/files/{}/blob", share.file_id)))
                    .send()
                    .await?,
            )
            .await?;

            let ciphertext = STANDARD
                .decode(blob.ciphertext)
                .context("server returned malformed ciphertext")?;
            let iv: [u8; IV_LEN] = custody::decode_from_url(&blob.iv)?
                .try_into()
                .map_err(|_| anyhow::anyhow!("server returned a malformed IV"))?;
            let plaintext = custody::decrypt(&ciphertext, &share.key, &iv)?;

            let path = output.unwrap_or_else(|| local_file_name(&blob.filename));
            tokio::fs::write(&path, &plaintext)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{} ({} bytes, {})", path.display(), plaintext.len(), blob.mime_type);
        }
    }

    Ok(())
}
