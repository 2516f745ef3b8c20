//! Blocking HTTP plumbing shared by the remote providers.

use super::circuit_breaker::CircuitBreaker;
use super::provider::FetchError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;

/// Build the client every provider of a region shares.
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| FetchError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))
}

/// Map a transport error onto [`FetchError`].
pub fn classify(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_decode() {
        FetchError::ResponseFormatChanged(err.to_string())
    } else {
        FetchError::NetworkUnreachable(err.to_string())
    }
}

/// GET `url` and return the body, updating `breaker` from the status code.
///
/// `context` names the request in errors; it must not contain secrets.
pub fn get_text(
    client: &Client,
    url: &str,
    breaker: &CircuitBreaker,
    context: &str,
) -> Result<String, FetchError> {
    if !breaker.is_allowed() {
        return Err(FetchError::CircuitBreakerTripped);
    }

    let resp = client.get(url).send().map_err(|e| classify(&e))?;
    let status = resp.status();

    if status == StatusCode::FORBIDDEN {
        breaker.trip();
        return Err(FetchError::CircuitBreakerTripped);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        breaker.record_failure();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(FetchError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(FetchError::AuthenticationRequired(context.to_string()));
    }

    if !status.is_success() {
        if status.is_server_error() {
            breaker.record_failure();
        }
        return Err(FetchError::Http {
            status: status.as_u16(),
            context: context.to_string(),
        });
    }

    let body = resp.text().map_err(|e| classify(&e))?;
    breaker.record_success();
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::circuit_breaker::TripCause;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answer `times` requests on a local port with a fixed raw response.
    fn serve(response: &'static str, times: usize) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/price", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            for _ in 0..times {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        (url, handle)
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    const RATE_LIMITED: &str = "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 7\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const FORBIDDEN: &str = "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    #[test]
    fn repeated_rate_limits_open_the_breaker() {
        let (url, server) = serve(RATE_LIMITED, 3);
        let client = local_client();
        let breaker = CircuitBreaker::new(Duration::from_secs(60), 3);

        for _ in 0..3 {
            assert!(breaker.is_allowed());
            let err = get_text(&client, &url, &breaker, "test").unwrap_err();
            assert!(matches!(err, FetchError::RateLimited { retry_after_secs: 7 }));
        }
        server.join().unwrap();

        assert!(!breaker.is_allowed());
        assert_eq!(breaker.cause(), Some(TripCause::RepeatedFailures));
        // refused locally, nothing is listening any more
        assert!(matches!(
            get_text(&client, &url, &breaker, "test"),
            Err(FetchError::CircuitBreakerTripped)
        ));
    }

    #[test]
    fn forbidden_opens_the_breaker_at_once() {
        let (url, server) = serve(FORBIDDEN, 1);
        let breaker = CircuitBreaker::new(Duration::from_secs(60), 3);

        let err = get_text(&local_client(), &url, &breaker, "test").unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, FetchError::CircuitBreakerTripped));
        assert_eq!(breaker.cause(), Some(TripCause::Forbidden));
    }
}
