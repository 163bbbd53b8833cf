//! MTProto client wrapper around grammers

use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::error::MtProtoError;
use grabcore::config;

/// MTProto client signed in as a user
pub struct MtProtoClient {
    client: Client,
    session_path: PathBuf,
}

impl MtProtoClient {
    async fn connect(api_id: i32, api_hash: &str, session_path: &Path) -> Result<Self, MtProtoError> {
        let session = if session_path.exists() {
            log::info!("Loading existing session from {:?}", session_path);
            Session::load_file(session_path)
                .map_err(|e| MtProtoError::Session(format!("Failed to load session: {}", e)))?
        } else {
            log::info!("Creating new session");
            Session::new()
        };

        let config = Config {
            session,
            api_id,
            api_hash: api_hash.to_string(),
            params: InitParams {
                device_model: "Grab Search Client".to_string(),
                system_version: "1.0".to_string(),
                app_version: env!("CARGO_PKG_VERSION").to_string(),
                system_lang_code: "en".to_string(),
                lang_code: "en".to_string(),
                ..Default::default()
            },
        };

        log::info!("Connecting to Telegram...");
        let client = Client::connect(config)
            .await
            .map_err(|e| MtProtoError::Session(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            client,
            session_path: session_path.to_path_buf(),
        })
    }

    /// Open the saved user session; fails with `NotAuthorized` when nobody logged in yet
    pub async fn open_user(api_id: i32, api_hash: &str, session_path: &Path) -> Result<Self, MtProtoError> {
        let this = Self::connect(api_id, api_hash, session_path).await?;
        if !this.is_authorized().await? {
            return Err(MtProtoError::NotAuthorized);
        }
        log::info!("MTProto session authorized");
        Ok(this)
    }

    /// Client for the configured API credentials and session file
    pub async fn from_config() -> Result<Self, MtProtoError> {
        let (api_id, api_hash) = credentials()?;
        Self::open_user(api_id, &api_hash, Path::new(config::search::SESSION_PATH.as_str())).await
    }

    /// Interactive phone/code/password sign-in on the terminal.
    ///
    /// Saves the session to MTPROTO_SESSION_PATH and returns the user id.
    pub async fn login_interactive() -> Result<i64, MtProtoError> {
        let (api_id, api_hash) = credentials()?;
        let this = Self::connect(api_id, &api_hash, Path::new(config::search::SESSION_PATH.as_str())).await?;
        if this.is_authorized().await? {
            log::info!("Already authorized");
            return Ok(this.client.get_me().await?.id());
        }

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let phone = prompt(&mut stdin, "Phone number (international format): ").await?;
        let token = this
            .client
            .request_login_code(phone.trim())
            .await
            .map_err(|e| MtProtoError::SignIn(e.to_string()))?;

        let code = prompt(&mut stdin, "Login code: ").await?;
        let user = match this.client.sign_in(&token, code.trim()).await {
            Ok(user) => user,
            Err(SignInError::PasswordRequired(password_token)) => {
                let password = prompt(&mut stdin, "Two-step verification password: ").await?;
                this.client
                    .check_password(password_token, password.trim())
                    .await
                    .map_err(|e| MtProtoError::SignIn(e.to_string()))?
            }
            Err(e) => return Err(MtProtoError::SignIn(e.to_string())),
        };

        this.save_session()?;
        Ok(user.id())
    }

    fn save_session(&self) -> Result<(), MtProtoError> {
        if let Some(parent) = self.session_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // grammers-session 0.5 writes into an existing file
        if !self.session_path.exists() {
            std::fs::File::create(&self.session_path)?;
        }
        self.client
            .session()
            .save_to_file(&self.session_path)
            .map_err(|e| MtProtoError::Session(format!("Failed to save session: {}", e)))?;
        log::info!("Session saved to {:?}", self.session_path);
        Ok(())
    }

    /// Get the underlying grammers client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Check if the client is authorized
    pub async fn is_authorized(&self) -> Result<bool, MtProtoError> {
        self.client.is_authorized().await.map_err(MtProtoError::Invocation)
    }
}

fn credentials() -> Result<(i32, String), MtProtoError> {
    let api_id = config::search::TELEGRAM_API_ID.ok_or(MtProtoError::NotConfigured("TELEGRAM_API_ID"))?;
    let api_hash = config::search::TELEGRAM_API_HASH
        .clone()
        .ok_or(MtProtoError::NotConfigured("TELEGRAM_API_HASH"))?;
    Ok((api_id, api_hash))
}

async fn prompt<R>(lines: &mut tokio::io::Lines<R>, message: &str) -> Result<String, MtProtoError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(message.as_bytes()).await?;
    stdout.flush().await?;
    lines
        .next_line()
        .await?
        .ok_or_else(|| MtProtoError::SignIn("input closed".to_string()))
}
