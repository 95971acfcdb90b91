//! Principal resolution.
//!
//! The principal is the identity string mixed into every key derivation. It
//! is resolved per request through a fixed fallback chain:
//!
//! 1. an identifier already attached to the caller's session;
//! 2. the `sub` claim of a bearer token (HS256), taken from the
//!    `Authorization` header or the session cookie and verified against the
//!    process token secret;
//! 3. an anonymous identifier derived from the caller's network address.
//!
//! Each stage is tried only when the previous one is absent or fails
//! verification. A different outcome for the same user means different keys,
//! so existing envelopes for that user stop decrypting.

use std::fmt;
use std::net::IpAddr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ring::hmac;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{Secret, VaultConfig};

/// Default name of the cookie carrying the session token.
pub const DEFAULT_SESSION_COOKIE: &str = "session-token";

/// Prefix marking a principal that was not authenticated.
pub const ANONYMOUS_PREFIX: &str = "anon:";

/// The request facts the resolver looks at.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// User id already attached to the session by the auth layer.
    pub session_user_id: Option<String>,
    /// Raw `Authorization` header.
    pub authorization: Option<String>,
    /// Raw `Cookie` header.
    pub cookie_header: Option<String>,
    /// Raw `X-Forwarded-For` header.
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` header.
    pub real_ip: Option<String>,
    /// Peer address of the connection.
    pub remote_addr: Option<IpAddr>,
}

/// Which stage of the chain produced a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalSource {
    Session,
    BearerToken,
    SessionCookie,
    NetworkAddress,
}

/// A resolved principal identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    id: String,
    source: PrincipalSource,
}

impl Principal {
    /// The identifier to pass to the field cipher.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The stage that produced this principal.
    pub fn source(&self) -> PrincipalSource {
        self.source
    }

    /// True for address-derived principals.
    pub fn is_anonymous(&self) -> bool {
        self.source == PrincipalSource::NetworkAddress
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Why a bearer token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token secret not configured")]
    NotConfigured,
    #[error("malformed token")]
    Malformed,
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token has no subject")]
    MissingSubject,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

#[derive(Deserialize)]
struct Claims {
    sub: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
}

/// Resolves principals from request context.
#[derive(Debug, Clone)]
pub struct PrincipalResolver {
    token_key: Option<hmac::Key>,
    cookie_name: String,
}

impl PrincipalResolver {
    /// Build a resolver. Without a token secret, stage 2 is skipped.
    pub fn new(token_secret: Option<&Secret>) -> Self {
        Self {
            token_key: token_secret.map(|s| hmac::Key::new(hmac::HMAC_SHA256, s.as_bytes())),
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }

    /// Build a resolver from the process configuration.
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(config.token_secret.as_ref())
    }

    /// Read the session token from a differently named cookie.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Resolve the principal for `ctx` at the current time.
    pub fn resolve(&self, ctx: &RequestContext) -> Principal {
        self.resolve_at(ctx, Utc::now())
    }

    /// Resolve the principal for `ctx`, checking token times against `now`.
    pub fn resolve_at(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Principal {
        if let Some(id) = ctx
            .session_user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            return Principal {
                id: id.to_string(),
                source: PrincipalSource::Session,
            };
        }

        let candidates = [
            (bearer_token(ctx), PrincipalSource::BearerToken),
            (self.cookie_token(ctx), PrincipalSource::SessionCookie),
        ];
        for (token, source) in candidates {
            let Some(token) = token else { continue };
            match self.verify_token(token, now) {
                Ok(sub) => return Principal { id: sub, source },
                Err(err) => debug!(?source, error = %err, "rejecting credential"),
            }
        }

        Principal {
            id: format!("{ANONYMOUS_PREFIX}{}", network_origin(ctx)),
            source: PrincipalSource::NetworkAddress,
        }
    }

    /// Verify a compact HS256 token and return its subject.
    pub fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let key = self.token_key.as_ref().ok_or(TokenError::NotConfigured)?;

        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        hmac::verify(key, signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_segment(claims_b64)?;
        let now = now.timestamp();
        if claims.exp.is_some_and(|exp| now >= exp) {
            return Err(TokenError::Expired);
        }
        if claims.nbf.is_some_and(|nbf| now < nbf) {
            return Err(TokenError::NotYetValid);
        }

        claims
            .sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or(TokenError::MissingSubject)
    }

    fn cookie_token<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        ctx.cookie_header
            .as_deref()?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

fn bearer_token(ctx: &RequestContext) -> Option<&str> {
    let header = ctx.authorization.as_deref()?.trim();
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn network_origin(ctx: &RequestContext) -> String {
    let forwarded = ctx
        .forwarded_for
        .as_deref()
        .and_then(|list| list.split(',').next())
        .map(str::trim);
    let real_ip = ctx.real_ip.as_deref().map(str::trim);

    forwarded
        .into_iter()
        .chain(real_ip)
        .find(|addr| !addr.is_empty())
        .map(str::to_string)
        .or_else(|| ctx.remote_addr.map(|addr| addr.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    const TOKEN_SECRET: &str = "token-secret";

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn mint(secret: &str, header: serde_json::Value, claims: serde_json::Value) -> String {
        let head = URL_SAFE_NO_PAD.encode(header.to_string());
        let body = URL_SAFE_NO_PAD.encode(claims.to_string());
        let input = format!("{head}.{body}");
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(hmac::sign(&key, input.as_bytes()));
        format!("{input}.{sig}")
    }

    fn token(claims: serde_json::Value) -> String {
        mint(TOKEN_SECRET, json!({"alg": "HS256", "typ": "JWT"}), claims)
    }

    fn resolver() -> PrincipalResolver {
        PrincipalResolver::new(Some(&Secret::new(TOKEN_SECRET).unwrap()))
    }

    #[test]
    fn session_identifier_wins() {
        let ctx = RequestContext {
            session_user_id: Some("user-42".into()),
            authorization: Some(format!("Bearer {}", token(json!({"sub": "user-99"})))),
            ..Default::default()
        };
        let principal = resolver().resolve_at(&ctx, now());
        assert_eq!(principal.as_str(), "user-42");
        assert_eq!(principal.source(), PrincipalSource::Session);
    }

    #[test]
    fn bearer_token_subject_is_used() {
        let ctx = RequestContext {
            authorization: Some(format!("Bearer {}", token(json!({"sub": "user-7"})))),
            ..Default::default()
        };
        let principal = resolver().resolve_at(&ctx, now());
        assert_eq!(principal.as_str(), "user-7");
        assert_eq!(principal.source(), PrincipalSource::BearerToken);
    }

    #[test]
    fn session_cookie_is_used_when_no_header() {
        let cookie = format!("theme=dark; session-token={}; other=1", token(json!({"sub": "u1"})));
        let ctx = RequestContext {
            cookie_header: Some(cookie),
            ..Default::default()
        };
        let principal = resolver().resolve_at(&ctx, now());
        assert_eq!(principal.as_str(), "u1");
        assert_eq!(principal.source(), PrincipalSource::SessionCookie);
    }

    #[test]
    fn bad_bearer_falls_through_to_cookie() {
        let ctx = RequestContext {
            authorization: Some(format!(
                "Bearer {}",
                mint("wrong", json!({"alg": "HS256"}), json!({"sub": "mallory"}))
            )),
            cookie_header: Some(format!("session-token={}", token(json!({"sub": "u1"})))),
            ..Default::default()
        };
        assert_eq!(resolver().resolve_at(&ctx, now()).as_str(), "u1");
    }

    #[test]
    fn token_rejections() {
        let r = resolver();
        let t = now().timestamp();

        let forged = mint("wrong", json!({"alg": "HS256"}), json!({"sub": "x"}));
        assert_eq!(r.verify_token(&forged, now()), Err(TokenError::BadSignature));

        let none_alg = mint(TOKEN_SECRET, json!({"alg": "none"}), json!({"sub": "x"}));
        assert_eq!(r.verify_token(&none_alg, now()), Err(TokenError::UnsupportedAlgorithm));

        let expired = token(json!({"sub": "x", "exp": t - 1}));
        assert_eq!(r.verify_token(&expired, now()), Err(TokenError::Expired));

        let early = token(json!({"sub": "x", "nbf": t + 60}));
        assert_eq!(r.verify_token(&early, now()), Err(TokenError::NotYetValid));

        let anonymous = token(json!({"exp": t + 60}));
        assert_eq!(r.verify_token(&anonymous, now()), Err(TokenError::MissingSubject));

        assert_eq!(r.verify_token("a.b", now()), Err(TokenError::Malformed));

        let valid = token(json!({"sub": "x", "exp": t + 60, "nbf": t - 60}));
        assert_eq!(r.verify_token(&valid, now()), Ok("x".to_string()));
    }

    #[test]
    fn tokens_are_ignored_without_a_secret() {
        let ctx = RequestContext {
            authorization: Some(format!("Bearer {}", token(json!({"sub": "user-7"})))),
            remote_addr: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
            ..Default::default()
        };
        let principal = PrincipalResolver::new(None).resolve_at(&ctx, now());
        assert_eq!(principal.as_str(), "anon:10.0.0.5");
        assert!(principal.is_anonymous());
    }

    #[test]
    fn network_fallback_order() {
        let r = resolver();
        let mut ctx = RequestContext {
            forwarded_for: Some(" 203.0.113.9, 10.0.0.1".into()),
            real_ip: Some("198.51.100.2".into()),
            remote_addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            ..Default::default()
        };
        assert_eq!(r.resolve_at(&ctx, now()).as_str(), "anon:203.0.113.9");

        ctx.forwarded_for = None;
        assert_eq!(r.resolve_at(&ctx, now()).as_str(), "anon:198.51.100.2");

        ctx.real_ip = None;
        assert_eq!(r.resolve_at(&ctx, now()).as_str(), "anon:127.0.0.1");

        ctx.remote_addr = None;
        assert_eq!(r.resolve_at(&ctx, now()).as_str(), "anon:unknown");
    }
}
