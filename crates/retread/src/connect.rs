//! Scoped connection acquisition.
//!
//! The reconciler borrows a [`Client`] for one pass; this module is how
//! the caller gets one. The deployment target requires encrypted
//! connections but does not present a verifiable certificate chain, so
//! [`TlsMode::RequireInsecure`] encrypts without validating the chain.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, NoTls, Socket};

use crate::Result;

/// How to secure the database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plaintext. Local development and test containers.
    Disabled,
    /// Encrypted, but certificate validation is relaxed: the hosted
    /// database terminates TLS with a certificate no chain verifies.
    RequireInsecure,
}

/// Connection parameters, typically mapped from `retread-config`.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub tls: TlsMode,
}

/// Connect and spawn the connection driver task.
///
/// The returned handle finishes once the client is dropped, so holding
/// both in one scope gives acquire-use-release on every exit path.
pub async fn connect(opts: &ConnectOptions) -> Result<(Client, JoinHandle<()>)> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&opts.host)
        .port(opts.port)
        .user(&opts.user)
        .password(&opts.password)
        .dbname(&opts.dbname);

    match opts.tls {
        TlsMode::Disabled => {
            config.ssl_mode(SslMode::Disable);
            drive(&config, NoTls).await
        }
        TlsMode::RequireInsecure => {
            config.ssl_mode(SslMode::Require);
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()?;
            let tls = postgres_native_tls::MakeTlsConnector::new(connector);
            drive(&config, tls).await
        }
    }
}

async fn drive<T>(config: &tokio_postgres::Config, tls: T) -> Result<(Client, JoinHandle<()>)>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client, connection) = config.connect(tls).await?;

    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "database connection terminated");
        }
    });

    Ok((client, driver))
}
