use std::fmt;

use url::Url;

use crate::error::GatewayError;

/// Gateway URL with its scheme upgraded to the socket layer
/// (`http` to `ws`, `https` to `wss`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAddress {
    url: Url,
}

impl GatewayAddress {
    pub fn parse(address: &str) -> Result<Self, GatewayError> {
        let invalid = |reason: String| GatewayError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let mut url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(invalid(format!("unsupported scheme {other:?}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;

        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

impl fmt::Display for GatewayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
