//! Client credentials derived from the agent's MySQL DSN.

use crate::utils::errors::{PitrError, Result};
use mysql_async::Opts;

/// Connection parameters handed to the `mysql` command-line client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub socket: Option<String>,
}

impl ClientCredentials {
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let opts = Opts::from_url(dsn)
            .map_err(|e| PitrError::Config(format!("invalid DSN: {}", e)))?;

        Ok(Self {
            host: opts.ip_or_hostname().to_string(),
            port: opts.tcp_port(),
            user: opts.user().map(str::to_string),
            password: opts.pass().map(str::to_string),
            database: opts.db_name().map(str::to_string),
            socket: opts.socket().map(str::to_string),
        })
    }

    /// Arguments for the `mysql` client. The password is passed through
    /// `MYSQL_PWD` (see [`ClientCredentials::env`]) so it stays off the
    /// process list.
    pub fn client_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match &self.socket {
            Some(socket) => args.push(format!("--socket={}", socket)),
            None => {
                args.push(format!("--host={}", self.host));
                args.push(format!("--port={}", self.port));
            }
        }
        if let Some(user) = &self.user {
            args.push(format!("--user={}", user));
        }
        if let Some(database) = &self.database {
            args.push(database.clone());
        }
        args
    }

    pub fn env(&self) -> Vec<(&'static str, String)> {
        self.password
            .iter()
            .map(|password| ("MYSQL_PWD", password.clone()))
            .collect()
    }
}
