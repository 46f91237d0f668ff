//! Spotify authorization-code flow for a local CLI: open the consent URL,
//! catch the redirect on a localhost listener, exchange the code.
//! https://developer.spotify.com/documentation/web-api/tutorials/code-flow

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use crate::services::spotify::types::SpotifyTokenResponse;

const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const REDIRECT_ADDR: &str = "127.0.0.1:8888";
const REDIRECT_URI: &str = "http://localhost:8888/callback";

const SCOPES: &str =
    "playlist-read-private playlist-modify-public playlist-modify-private user-top-read";

const CALLBACK_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
<!DOCTYPE html><html><body><h1>Authorization successful!</h1>\
<p>You can close this window and return to the terminal.</p></body></html>";

/// Random state parameter for CSRF protection
fn generate_state() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..16)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Run the whole flow and return a fresh access token.
pub async fn authorize(client_id: &str, client_secret: &str) -> Result<SpotifyTokenResponse> {
    let state = generate_state();
    let auth_url = format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&state={}&scope={}",
        SPOTIFY_AUTH_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(REDIRECT_URI),
        urlencoding::encode(&state),
        urlencoding::encode(SCOPES)
    );

    println!("Open this URL in your browser to authorize Spotify:\n\n{auth_url}\n");
    println!("Waiting for the redirect on {REDIRECT_URI} ...");

    let code = listen_for_code(&state).await?;
    exchange_code_for_token(client_id, client_secret, &code).await
}

/// Accept a single redirect request and pull the authorization code out of
/// its query string.
async fn listen_for_code(expected_state: &str) -> Result<String> {
    let listener = TcpListener::bind(REDIRECT_ADDR)
        .await
        .wrap_err_with(|| format!("Failed to listen on {REDIRECT_ADDR}"))?;

    let (mut stream, _) = listener
        .accept()
        .await
        .wrap_err("Failed to accept the authorization redirect")?;

    let mut buf = vec![0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .wrap_err("Failed to read the authorization redirect")?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or(eyre!("Malformed redirect request"))?;
    let url = Url::parse(&format!("http://localhost{path}"))
        .wrap_err("Failed to parse the redirect URL")?;

    let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

    stream.write_all(CALLBACK_PAGE.as_bytes()).await.ok();

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(eyre!("State mismatch in the authorization redirect"));
    }
    params
        .get("code")
        .cloned()
        .ok_or_else(|| match params.get("error") {
            Some(error) => eyre!("Spotify authorization failed: {error}"),
            None => eyre!("No authorization code in the redirect"),
        })
}

/// Exchange authorization code for access token
async fn exchange_code_for_token(
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> Result<SpotifyTokenResponse> {
    let client = reqwest::Client::new();

    let mut params = HashMap::new();
    params.insert("grant_type", "authorization_code");
    params.insert("code", code);
    params.insert("redirect_uri", REDIRECT_URI);

    let response = client
        .post(SPOTIFY_TOKEN_URL)
        // Serializes to x-www-form-urlencoded as required by Spotify
        .form(&params)
        .header(
            "Authorization",
            format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", client_id, client_secret))
            ),
        )
        .send()
        .await
        .wrap_err("Failed to send the token request")?;

    if !response.status().is_success() {
        let reason = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error text".to_string());
        return Err(eyre!("Token exchange rejected: {reason}"));
    }

    response
        .json()
        .await
        .wrap_err("Failed to parse the token response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_state() {
        let state = generate_state();
        assert_eq!(state.len(), 16);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_states_differ() {
        assert_ne!(generate_state(), generate_state());
    }
}
