//! Endpoint URL parsing for the `opc.tcp://host:port/path` scheme.

use crate::status_code::StatusCode;

/// Extract `(host, port)` from an `opc.tcp://` endpoint url, falling back to
/// `default_port` when the url carries none.
pub fn hostname_port_from_url(
    url: &str,
    default_port: u16,
) -> Result<(String, u16), StatusCode> {
    let stripped = url
        .strip_prefix("opc.tcp://")
        .ok_or(StatusCode::BadTcpEndpointUrlInvalid)?;
    let host_port = stripped.split('/').next().unwrap_or("");
    if host_port.is_empty() {
        return Err(StatusCode::BadTcpEndpointUrlInvalid);
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| StatusCode::BadTcpEndpointUrlInvalid)?;
            Ok((host.to_string(), port))
        }
        None => Ok((host_port.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let (host, port) = hostname_port_from_url("opc.tcp://h:4840", 4840).unwrap();
        assert_eq!(host, "h");
        assert_eq!(port, 4840);
    }

    #[test]
    fn falls_back_to_default_port() {
        let (host, port) = hostname_port_from_url("opc.tcp://h", 4840).unwrap();
        assert_eq!(host, "h");
        assert_eq!(port, 4840);
    }

    #[test]
    fn rejects_non_opc_scheme() {
        assert!(hostname_port_from_url("http://h:80", 4840).is_err());
    }
}
