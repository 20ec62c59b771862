//! Notification registry and dispatch pipeline.
//!
//! Handlers are registered on a [`RegistryBuilder`] during setup and frozen into
//! a [`HandlerRegistry`] that is shared read-only afterwards. A [`Dispatcher`]
//! takes one raw webhook body through
//! `Received -> Decoded -> Verified -> Resolved -> Invoked -> Acknowledged`;
//! any error short-circuits to [`Acknowledgement::Retry`].

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::chain::SignedDataVerifier;
use crate::error::IapError;
use crate::jws::JsonMap;
use crate::provider::ProviderProfile;

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type HandleFn = Arc<dyn Fn(&str, &JsonMap) -> Result<bool, HandlerError> + Send + Sync>;

/// Registry key: `type`, or `type.subtype` when a subtype is given.
pub fn composite_key(notification_type: &str, subtype: Option<&str>) -> String {
    match subtype {
        Some(sub) if !sub.is_empty() => format!("{notification_type}.{sub}"),
        _ => notification_type.to_string(),
    }
}

/// A handler bound to one notification type and optional subtype.
///
/// The closure receives the provider name and the verified payload. Only
/// `Ok(true)` counts as handled.
#[derive(Clone)]
pub struct NotificationHandler {
    pub notification_type: String,
    pub subtype: Option<String>,
    handle: HandleFn,
}

impl NotificationHandler {
    pub fn new<F>(notification_type: impl Into<String>, subtype: Option<&str>, handle: F) -> Self
    where
        F: Fn(&str, &JsonMap) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        Self {
            notification_type: notification_type.into(),
            subtype: subtype.filter(|s| !s.is_empty()).map(str::to_string),
            handle: Arc::new(handle),
        }
    }

    pub fn key(&self) -> String {
        composite_key(&self.notification_type, self.subtype.as_deref())
    }

    pub fn handle(&self, provider: &str, payload: &JsonMap) -> Result<bool, HandlerError> {
        (self.handle)(provider, payload)
    }
}

impl fmt::Debug for NotificationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHandler")
            .field("notification_type", &self.notification_type)
            .field("subtype", &self.subtype)
            .finish_non_exhaustive()
    }
}

/// Setup-phase registry. Later registrations under the same key win.
#[derive(Debug, Default, Clone)]
pub struct RegistryBuilder {
    handlers: HashMap<String, NotificationHandler>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: NotificationHandler) -> Self {
        if handler.notification_type.is_empty() {
            tracing::warn!("ignoring notification handler with empty type");
            return self;
        }
        let key = handler.key();
        if self.handlers.insert(key.clone(), handler).is_some() {
            tracing::debug!(key = %key, "notification handler replaced");
        }
        self
    }

    /// Register a closure for `notification_type` and optional `subtype`.
    pub fn on<F>(self, notification_type: &str, subtype: Option<&str>, handle: F) -> Self
    where
        F: Fn(&str, &JsonMap) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.register(NotificationHandler::new(notification_type, subtype, handle))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Freeze the registry.
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

/// Frozen handler table. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<String, NotificationHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, key: &str) -> Option<&NotificationHandler> {
        self.handlers.get(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// Outcome reported to the webhook sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Accepted,
    /// The sender should redeliver.
    Retry,
}

impl Acknowledgement {
    pub fn status_code(self) -> u16 {
        match self {
            Acknowledgement::Accepted => 200,
            Acknowledgement::Retry => 500,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Acknowledgement::Accepted
    }
}

/// Dispatch pipeline for one provider.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    profile: ProviderProfile,
    verifier: SignedDataVerifier,
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(
        profile: ProviderProfile,
        verifier: SignedDataVerifier,
        registry: HandlerRegistry,
    ) -> Self {
        Self {
            profile,
            verifier,
            registry,
        }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run the pipeline, returning the first error.
    pub fn process(&self, raw_body: &[u8]) -> Result<(), IapError> {
        let profile = &self.profile;

        let envelope = match serde_json::from_slice::<Value>(raw_body) {
            Ok(Value::Object(map)) if !map.is_empty() => map,
            Ok(_) => {
                return Err(IapError::InvalidNotification(
                    "body is not a non-empty JSON object".to_string(),
                ))
            }
            Err(e) => {
                return Err(IapError::InvalidNotification(format!(
                    "body is not valid JSON: {e}"
                )))
            }
        };

        let token = match envelope.get(&profile.envelope_field) {
            Some(Value::String(token)) => token,
            Some(_) => {
                return Err(IapError::InvalidNotification(format!(
                    "'{}' is not a string",
                    profile.envelope_field
                )))
            }
            None => {
                return Err(IapError::InvalidNotification(format!(
                    "missing '{}'",
                    profile.envelope_field
                )))
            }
        };

        let mut payload = self.verifier.verify(token)?;

        let notification_type = optional_str(&payload, &profile.type_field)?.unwrap_or_default();
        let subtype = optional_str(&payload, &profile.subtype_field)?;
        let key = composite_key(&notification_type, subtype.as_deref());

        resolve_nested(&mut payload, &profile.nested_fields, &self.verifier)?;

        let handler = self
            .registry
            .get(&key)
            .ok_or_else(|| IapError::HandlerNotFound(key.clone()))?;

        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(&profile.name, &payload)));
        match outcome {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(IapError::HandlerFailure(format!(
                "handler for '{key}' returned false"
            ))),
            Ok(Err(e)) => Err(IapError::HandlerFailure(format!(
                "handler for '{key}' failed: {e}"
            ))),
            Err(panic) => Err(IapError::HandlerFailure(format!(
                "handler for '{key}' panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Run the pipeline and convert the outcome into an acknowledgement.
    pub fn dispatch(&self, raw_body: &[u8]) -> Acknowledgement {
        let provider = self.profile.name.as_str();
        match self.process(raw_body) {
            Ok(()) => {
                tracing::info!(provider = %provider, "notification handled");
                Acknowledgement::Accepted
            }
            Err(e) if e.is_verification_failure() => {
                tracing::warn!(provider = %provider, error = %e, "notification rejected");
                Acknowledgement::Retry
            }
            Err(e @ IapError::InvalidNotification(_)) => {
                tracing::warn!(provider = %provider, error = %e, "invalid notification body");
                Acknowledgement::Retry
            }
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "notification not handled");
                Acknowledgement::Retry
            }
        }
    }
}

/// Run one notification body through `registry`. `true` means handled.
pub fn dispatch(
    raw_body: &[u8],
    registry: &HandlerRegistry,
    verifier: &SignedDataVerifier,
    profile: &ProviderProfile,
) -> bool {
    Dispatcher::new(profile.clone(), verifier.clone(), registry.clone())
        .dispatch(raw_body)
        .is_accepted()
}

/// Replace each signed string at a dotted `path` with its verified payload.
///
/// Arrays met along the path are walked element by element, and a segment may
/// carry a `[]` suffix to say so explicitly (`data[].lastTransactions[].signedTransactionInfo`).
/// An array at the end of the path is decoded element-wise. Absent, `null` and
/// empty-string fields are left untouched. Any other non-string value is malformed.
pub fn resolve_nested(
    payload: &mut JsonMap,
    paths: &[String],
    verifier: &SignedDataVerifier,
) -> Result<(), IapError> {
    for path in paths {
        let segments: Vec<&str> = path
            .split('.')
            .map(|s| s.strip_suffix("[]").unwrap_or(s))
            .collect();
        let Some((first, rest)) = segments.split_first() else {
            continue;
        };
        let Some(root) = payload.get_mut(*first) else {
            continue;
        };
        let mut slots = Vec::new();
        collect_slots(root, rest, &mut slots);
        for slot in slots {
            resolve_slot(slot, path, verifier)?;
        }
    }
    Ok(())
}

fn collect_slots<'a>(value: &'a mut Value, segments: &[&str], out: &mut Vec<&'a mut Value>) {
    if segments.is_empty() && !value.is_array() {
        out.push(value);
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_slots(item, segments, out);
            }
        }
        Value::Object(map) => {
            if let Some(next) = map.get_mut(segments[0]) {
                collect_slots(next, &segments[1..], out);
            }
        }
        _ => {}
    }
}

fn resolve_slot(
    slot: &mut Value,
    path: &str,
    verifier: &SignedDataVerifier,
) -> Result<(), IapError> {
    let token = match &*slot {
        Value::Null => return Ok(()),
        Value::String(token) if token.is_empty() => return Ok(()),
        Value::String(token) => token.clone(),
        _ => {
            return Err(IapError::MalformedToken(format!(
                "nested field '{path}' is not a string"
            )))
        }
    };
    *slot = Value::Object(verifier.verify(&token)?);
    Ok(())
}

fn optional_str(payload: &JsonMap, field: &str) -> Result<Option<String>, IapError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(IapError::InvalidNotification(format!(
            "'{field}' is not a string"
        ))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::VerificationConfig;
    use crate::jws;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unchecked_verifier() -> SignedDataVerifier {
        SignedDataVerifier::new(VerificationConfig::new("1.2.3").insecure_unsafe_mode())
    }

    fn token(payload: Value) -> String {
        let header = json!({"alg": "ES256"}).as_object().cloned().unwrap();
        jws::encode(&header, payload.as_object().unwrap(), b"sig").unwrap()
    }

    fn body(field: &str, payload: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({ field: token(payload) })).unwrap()
    }

    fn accept(_: &str, _: &JsonMap) -> Result<bool, HandlerError> {
        Ok(true)
    }

    #[test]
    fn test_composite_key() {
        assert_eq!(composite_key("SUBSCRIBED", Some("INITIAL_BUY")), "SUBSCRIBED.INITIAL_BUY");
        assert_eq!(composite_key("REFUND", None), "REFUND");
        assert_eq!(composite_key("REFUND", Some("")), "REFUND");
    }

    #[test]
    fn test_acknowledgement_status() {
        assert_eq!(Acknowledgement::Accepted.status_code(), 200);
        assert_eq!(Acknowledgement::Retry.status_code(), 500);
        assert!(!Acknowledgement::Retry.is_accepted());
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = RegistryBuilder::new()
            .on("REFUND", None, |_, _| Ok(false))
            .on("REFUND", None, accept)
            .build();
        assert_eq!(registry.len(), 1);
        let handler = registry.get("REFUND").unwrap();
        assert!(handler.handle("apple", &JsonMap::new()).unwrap());
    }

    #[test]
    fn test_empty_type_is_skipped() {
        let builder = RegistryBuilder::new().on("", Some("X"), accept);
        assert!(builder.is_empty());
    }

    #[test]
    fn test_registry_clone_shares_table() {
        let registry = RegistryBuilder::new().on("A", None, accept).on("B", Some("C"), accept).build();
        let clone = registry.clone();
        assert_eq!(clone.keys(), vec!["A", "B.C"]);
    }

    #[test]
    fn test_subtype_key_does_not_fall_back_to_type() {
        let registry = RegistryBuilder::new().on("DID_RENEW", None, accept).build();
        let dispatcher = Dispatcher::new(ProviderProfile::apple(), unchecked_verifier(), registry);
        let raw = body(
            "signedPayload",
            json!({"notificationType": "DID_RENEW", "subtype": "BILLING_RECOVERY"}),
        );
        assert!(matches!(
            dispatcher.process(&raw),
            Err(IapError::HandlerNotFound(ref k)) if k == "DID_RENEW.BILLING_RECOVERY"
        ));
    }

    #[test]
    fn test_envelope_errors() {
        let registry = RegistryBuilder::new().on("A", None, accept).build();
        let dispatcher = Dispatcher::new(ProviderProfile::huawei(), unchecked_verifier(), registry);
        let bodies: [&[u8]; 5] = [
            b"not json",
            b"{}",
            b"[1]",
            br#"{"other":"x"}"#,
            br#"{"jwsNotification":7}"#,
        ];
        for raw in bodies {
            assert!(matches!(
                dispatcher.process(raw),
                Err(IapError::InvalidNotification(_))
            ));
            assert_eq!(dispatcher.dispatch(raw), Acknowledgement::Retry);
        }
    }

    #[test]
    fn test_handler_sees_provider_name_and_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let registry = RegistryBuilder::new()
            .on("ORDER_STATUS", None, move |provider, payload| {
                assert_eq!(provider, "huawei");
                assert_eq!(payload["notificationType"], "ORDER_STATUS");
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
            .build();
        let raw = body("jwsNotification", json!({"notificationType": "ORDER_STATUS"}));
        assert!(dispatch(&raw, &registry, &unchecked_verifier(), &ProviderProfile::huawei()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_type_is_not_found() {
        let registry = RegistryBuilder::new().on("A", None, accept).build();
        let dispatcher = Dispatcher::new(ProviderProfile::apple(), unchecked_verifier(), registry);
        let raw = body("signedPayload", json!({"other": 1}));
        assert!(matches!(dispatcher.process(&raw), Err(IapError::HandlerNotFound(_))));
    }

    #[test]
    fn test_resolve_nested_replaces_and_skips() {
        let mut payload = json!({
            "data": {
                "signedTransactionInfo": token(json!({"transactionId": "1000"})),
                "signedRenewalInfo": null,
            }
        })
        .as_object()
        .cloned()
        .unwrap();
        let paths = vec![
            "data.signedTransactionInfo".to_string(),
            "data.signedRenewalInfo".to_string(),
            "missing.path".to_string(),
        ];
        resolve_nested(&mut payload, &paths, &unchecked_verifier()).unwrap();
        assert_eq!(payload["data"]["signedTransactionInfo"]["transactionId"], "1000");
        assert!(payload["data"]["signedRenewalInfo"].is_null());
    }

    #[test]
    fn test_resolve_nested_rejects_non_string() {
        let mut payload = json!({"data": {"signedTransactionInfo": 42}})
            .as_object()
            .cloned()
            .unwrap();
        let err = resolve_nested(
            &mut payload,
            &["data.signedTransactionInfo".to_string()],
            &unchecked_verifier(),
        )
        .unwrap_err();
        assert!(matches!(err, IapError::MalformedToken(_)));
    }

    #[test]
    fn test_resolve_nested_rejects_non_string_array_element() {
        let mut payload = json!({"signedTransactions": [token(json!({"transactionId": "1"})), 7]})
            .as_object()
            .cloned()
            .unwrap();
        let err = resolve_nested(
            &mut payload,
            &["signedTransactions".to_string()],
            &unchecked_verifier(),
        )
        .unwrap_err();
        assert!(matches!(err, IapError::MalformedToken(_)));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
