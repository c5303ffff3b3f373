use crate::errors::{AppError, AppResult};
use crate::models::CredentialFields;
use std::path::PathBuf;

/// Local key-value credentials file consumed by the worker. The shell only
/// ever asks "does it exist?" and "write these fields"; it never reads the
/// secrets back.
#[derive(Debug, Clone)]
pub struct CredentialsStore {
    path: PathBuf,
}

impl CredentialsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn write(&self, fields: &CredentialFields, demo: bool) -> AppResult<()> {
        if fields.account.trim().is_empty() {
            return Err(AppError::BadRequest("account must not be empty".to_string()));
        }
        if fields.secret.is_empty() {
            return Err(AppError::BadRequest("secret must not be empty".to_string()));
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| AppError::Io(format!("create credentials dir: {}", error)))?;
        }
        std::fs::write(&self.path, render(fields, demo))
            .map_err(|error| AppError::Io(format!("write credentials file: {}", error)))?;
        Ok(())
    }
}

fn render(fields: &CredentialFields, demo: bool) -> String {
    let api_key_line = match fields.api_key.as_deref().filter(|key| !key.is_empty()) {
        Some(key) => format!("API_KEY={}", key),
        None => "# API_KEY=your-key-here".to_string(),
    };

    format!(
        "# Trading backend credentials\n\
         ACCOUNT_EMAIL={}\n\
         ACCOUNT_PASSWORD={}\n\
         {}\n\
         \n\
         # Demo mode settings\n\
         DEMO_MODE={}\n",
        fields.account, fields.secret, api_key_line, demo
    )
}
