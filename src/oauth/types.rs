//! Client and user account types.
//!
//! Defines identifiers, stored records, and the allow-listed inbound payloads
//! accepted by the client and user managers.

use crate::errors::{ClientError, UserError};
use crate::oauth::password::MAX_PASSWORD_BYTES;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use url::Url;

/// Grant assigned to every newly created user unless configured otherwise.
pub const DEFAULT_USER_GRANT: &str = "user";

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Ulid);

impl UserId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parse an inbound identifier, returning `None` when it is malformed
    pub fn parse(value: &str) -> Option<Self> {
        Ulid::from_string(value.trim()).ok().map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Ulid);

impl ClientId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parse an inbound identifier, returning `None` when it is malformed
    pub fn parse(value: &str) -> Option<Self> {
        Ulid::from_string(value.trim()).ok().map(Self)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registered third-party application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier
    pub id: ClientId,
    /// User that created the client
    pub owner_id: UserId,
    /// Display name
    pub client_name: String,
    /// Application home page
    pub client_uri: Option<String>,
    /// Redirect URI used by the application
    pub redirect_uri: Option<String>,
    /// Client secret
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` means the client never expires
    pub expired_at: Option<DateTime<Utc>>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Client {
    /// A client is valid while it has no expiration or the expiration is in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.is_none_or(|expired_at| expired_at > now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Password hash as produced by the configured hasher.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Login credential embedded in a user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Login name, the email at creation time
    pub username: String,
    /// Present only when the record was loaded with the password projected in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<PasswordHash>,
    /// Role tags
    pub grants: BTreeSet<String>,
}

/// User account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub institution: Option<String>,
    pub occupation: Option<String>,
    pub credential: Credential,
    /// Clients the user has granted access to, in grant order
    pub clients_authorized: Vec<ClientId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn has_authorized(&self, client_id: &ClientId) -> bool {
        self.clients_authorized.contains(client_id)
    }
}

/// Client creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewClient {
    pub client_name: String,
    #[serde(default)]
    pub client_uri: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
}

impl NewClient {
    pub fn validate(&self) -> Result<(), ClientError> {
        validate_client_name(&self.client_name)?;
        if let Some(ref uri) = self.client_uri {
            validate_client_uri(uri)?;
        }
        if let Some(ref uri) = self.redirect_uri {
            validate_redirect_uri(uri)?;
        }
        Ok(())
    }
}

/// Client update payload; only the named fields can change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientPatch {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_uri: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
}

impl ClientPatch {
    pub fn validate(&self) -> Result<(), ClientError> {
        if let Some(ref name) = self.client_name {
            validate_client_name(name)?;
        }
        if let Some(ref uri) = self.client_uri {
            validate_client_uri(uri)?;
        }
        if let Some(ref uri) = self.redirect_uri {
            validate_redirect_uri(uri)?;
        }
        Ok(())
    }
}

/// Body of an `enable` status change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpirationRequest {
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
}

/// Client status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationAction {
    /// Set the expiration to a caller-supplied instant, or clear it
    Enable,
    /// Expire the client now
    Disable,
}

impl FromStr for ExpirationAction {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enable" => Ok(ExpirationAction::Enable),
            "disable" => Ok(ExpirationAction::Disable),
            _ => Err(ClientError::InvalidAction(s.to_string())),
        }
    }
}

impl fmt::Display for ExpirationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpirationAction::Enable => f.write_str("enable"),
            ExpirationAction::Disable => f.write_str("disable"),
        }
    }
}

/// User creation payload
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), UserError> {
        if self.name.trim().is_empty() {
            return Err(UserError::InvalidPayload("name must not be empty".to_string()));
        }
        validate_email(&self.email)?;
        validate_password("password", &self.password)
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("institution", &self.institution)
            .field("occupation", &self.occupation)
            .finish()
    }
}

/// User update payload. Email, credential and authorizations are not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), UserError> {
        match self.name {
            Some(ref name) if name.trim().is_empty() => Err(UserError::InvalidPayload(
                "name must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Password rotation payload
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), UserError> {
        if self.current_password.len() > MAX_PASSWORD_BYTES {
            return Err(UserError::InvalidPayload(format!(
                "current_password must be at most {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }
        validate_password("new_password", &self.new_password)
    }
}

fn validate_password(field: &str, password: &str) -> Result<(), UserError> {
    if password.is_empty() {
        return Err(UserError::InvalidPayload(format!(
            "{} must not be empty",
            field
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(UserError::InvalidPayload(format!(
            "{} must be at most {} bytes",
            field, MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordChange(<redacted>)")
    }
}

/// Generate a client secret
pub fn generate_client_secret() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

fn validate_client_name(name: &str) -> Result<(), ClientError> {
    if name.trim().is_empty() {
        return Err(ClientError::InvalidPayload(
            "client_name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_client_uri(uri: &str) -> Result<(), ClientError> {
    let parsed = Url::parse(uri)
        .map_err(|e| ClientError::InvalidPayload(format!("Invalid client_uri: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(ClientError::InvalidPayload(
            "client_uri must use HTTP or HTTPS".to_string(),
        )),
    }
}

/// Validate a redirect URI
fn validate_redirect_uri(uri: &str) -> Result<(), ClientError> {
    let parsed = Url::parse(uri)
        .map_err(|e| ClientError::InvalidPayload(format!("Invalid redirect URI format: {}", e)))?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            // Only allow http for localhost
            let host = parsed.host_str().ok_or_else(|| {
                ClientError::InvalidPayload("Invalid redirect URI host".to_string())
            })?;
            if !host.starts_with("localhost") && !host.starts_with("127.0.0.1") {
                return Err(ClientError::InvalidPayload(
                    "HTTP redirect URIs only allowed for localhost".to_string(),
                ));
            }
        }
        _ => {
            return Err(ClientError::InvalidPayload(
                "Redirect URI must use HTTP or HTTPS".to_string(),
            ));
        }
    }

    if parsed.fragment().is_some() {
        return Err(ClientError::InvalidPayload(
            "Redirect URI must not contain fragment".to_string(),
        ));
    }

    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserError> {
    let invalid = || UserError::InvalidPayload(format!("Invalid email: {}", email));
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn client(expired_at: Option<DateTime<Utc>>) -> Client {
        let now = Utc::now();
        Client {
            id: ClientId::generate(),
            owner_id: UserId::generate(),
            client_name: "Catalog".to_string(),
            client_uri: None,
            redirect_uri: None,
            client_secret: generate_client_secret(),
            created_at: now,
            updated_at: now,
            expired_at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_client_validity() {
        let now = Utc::now();

        assert!(client(None).is_valid_at(now));
        assert!(client(Some(now + Duration::hours(1))).is_valid_at(now));
        assert!(!client(Some(now - Duration::seconds(1))).is_valid_at(now));
        // Expiration is exclusive
        assert!(!client(Some(now)).is_valid_at(now));
    }

    #[test]
    fn test_identifier_parsing() {
        let id = ClientId::generate();
        assert_eq!(ClientId::parse(&id.to_string()), Some(id));
        assert_eq!(ClientId::parse("5e8b1f2a9c"), None);
        assert_eq!(UserId::parse(""), None);
    }

    #[test]
    fn test_expiration_action_parsing() {
        assert_eq!(
            "enable".parse::<ExpirationAction>().unwrap(),
            ExpirationAction::Enable
        );
        assert_eq!(
            "DISABLE".parse::<ExpirationAction>().unwrap(),
            ExpirationAction::Disable
        );
        assert!(matches!(
            "pause".parse::<ExpirationAction>(),
            Err(ClientError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_unknown_payload_fields_are_rejected() {
        let result = serde_json::from_value::<ClientPatch>(serde_json::json!({
            "client_name": "Renamed",
            "owner_id": "01HZXW6T3Y1MZ0J7Q5N4B8C2D9",
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<UserPatch>(serde_json::json!({
            "credential": {"grants": ["admin"]},
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_redirect_uri_validation() {
        let mut payload = NewClient {
            client_name: "Catalog".to_string(),
            client_uri: None,
            redirect_uri: Some("https://catalog.example.com/callback".to_string()),
            expired_at: None,
        };
        assert!(payload.validate().is_ok());

        payload.redirect_uri = Some("http://localhost:3000/callback".to_string());
        assert!(payload.validate().is_ok());

        payload.redirect_uri = Some("http://catalog.example.com/callback".to_string());
        assert!(matches!(
            payload.validate(),
            Err(ClientError::InvalidPayload(_))
        ));

        payload.redirect_uri = Some("https://catalog.example.com/callback#frag".to_string());
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_new_user_validation() {
        let mut payload = NewUser {
            name: "Ana".to_string(),
            email: "a@x.com".to_string(),
            password: "secret".to_string(),
            institution: None,
            occupation: None,
        };
        assert!(payload.validate().is_ok());

        payload.email = "a@@x.com".to_string();
        assert!(payload.validate().is_err());

        payload.email = "a@x.com".to_string();
        payload.password = String::new();
        assert!(payload.validate().is_err());

        payload.password = "p".repeat(MAX_PASSWORD_BYTES);
        assert!(payload.validate().is_ok());
        payload.password.push('p');
        assert!(matches!(payload.validate(), Err(UserError::InvalidPayload(_))));
    }

    #[test]
    fn test_password_change_validation() {
        let longest = "p".repeat(MAX_PASSWORD_BYTES);
        let change = PasswordChange {
            current_password: longest.clone(),
            new_password: longest.clone(),
        };
        assert!(change.validate().is_ok());

        let change = PasswordChange {
            current_password: format!("{}p", longest),
            new_password: "new".to_string(),
        };
        assert!(matches!(change.validate(), Err(UserError::InvalidPayload(_))));

        let change = PasswordChange {
            current_password: "old".to_string(),
            new_password: format!("{}p", longest),
        };
        assert!(matches!(change.validate(), Err(UserError::InvalidPayload(_))));
    }

    #[test]
    fn test_secrets_are_redacted() {
        let payload = NewUser {
            name: "Ana".to_string(),
            email: "a@x.com".to_string(),
            password: "hunter2".to_string(),
            institution: None,
            occupation: None,
        };
        assert!(!format!("{:?}", payload).contains("hunter2"));

        let hash = PasswordHash::new("$2b$04$abcdefghijklmnopqrstuv".to_string());
        assert!(!format!("{:?}", hash).contains("$2b$"));
    }

    #[test]
    fn test_projected_credential_omits_password() {
        let credential = Credential {
            username: "a@x.com".to_string(),
            password: None,
            grants: BTreeSet::from([DEFAULT_USER_GRANT.to_string()]),
        };
        let value = serde_json::to_value(&credential).unwrap();
        assert!(value.get("password").is_none());
    }
}
