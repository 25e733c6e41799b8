//! TLS material loading.
//!
//! Builds a rustls `ClientConfig` from the PEM paths named in the network
//! configuration. The CA bundle replaces the system roots when present;
//! client authentication is enabled when a certificate and key are given.

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use snafu::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::config::NetworkConfig;
use crate::error::{
    ClientConfigSnafu, InvalidCaCertificateSnafu, ReadCertificateSnafu, ReadKeySnafu, TlsError,
};

/// Build the TLS client configuration for the configured network, or `None`
/// when no TLS material is configured at all (plain TCP).
pub fn client_config(network: &NetworkConfig) -> Result<Option<Arc<ClientConfig>>, TlsError> {
    if network.certificate.is_none() && network.key.is_none() && network.ca.is_none() {
        return Ok(None);
    }

    let roots = root_store(network.ca.as_deref())?;
    let builder = ClientConfig::builder().with_root_certificates(roots);

    let config = match (&network.certificate, &network.key) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = PrivateKeyDer::from_pem_file(key_path).context(ReadKeySnafu {
                path: key_path.display().to_string(),
            })?;
            builder
                .with_client_auth_cert(certs, key)
                .context(ClientConfigSnafu)?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Some(Arc::new(config)))
}

fn root_store(ca: Option<&Path>) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();

    match ca {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert).context(InvalidCaCertificateSnafu {
                    path: path.display().to_string(),
                })?;
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                tracing::warn!("Skipping unreadable native root certificate: {err}");
            }
            for cert in native.certs {
                // Individually invalid native roots are skipped, same as
                // every other TLS consumer of the platform store.
                let _ = roots.add(cert);
            }
        }
    }

    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .context(ReadCertificateSnafu {
            path: path.display().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkConfig, ServerConfig};

    fn network(ca: Option<&Path>) -> NetworkConfig {
        NetworkConfig {
            servers: vec![ServerConfig {
                addr: "localhost:5043".to_string(),
                name: None,
            }],
            certificate: None,
            key: None,
            ca: ca.map(Path::to_path_buf),
            timeout: 15,
            spool_size: 1024,
        }
    }

    #[test]
    fn no_material_means_plain_tcp() {
        let config = client_config(&network(None)).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn missing_ca_file_is_an_error() {
        let result = client_config(&network(Some(Path::new("/nonexistent/ca.pem"))));
        assert!(matches!(result, Err(TlsError::ReadCertificate { .. })));
    }
}
