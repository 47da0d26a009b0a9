//! Ofuscación de secretos antes de que lleguen a un log.

use once_cell::sync::Lazy;
use regex::Regex;

pub const OBSCURED: &str = "***";

// Fragmentos de credenciales en connection strings y URIs SAS.
static CREDENTIAL_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(AccountKey|SharedAccessKey|SharedAccessSignature|Password|Pwd|sig)=([^;&\s]+)")
        .expect("credential pattern")
});

/// Reemplaza cada secreto conocido y cada fragmento de credencial en `text`.
pub fn obscure_secrets(text: &str, secrets: &[String]) -> String {
    let mut out = text.to_string();
    // Primero los más largos: un secreto que contiene a otro se reemplaza entero.
    let mut ordered: Vec<&String> = secrets.iter().filter(|s| !s.is_empty()).collect();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));
    for secret in ordered {
        out = out.replace(secret.as_str(), OBSCURED);
    }
    CREDENTIAL_FRAGMENT.replace_all(&out, format!("$1={OBSCURED}").as_str()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_secrets_are_replaced() {
        let out = obscure_secrets("--telemetry=abc123 --seed=7", &["abc123".to_string()]);
        assert_eq!(out, "--telemetry=*** --seed=7");
    }

    #[test]
    fn connection_string_keys_are_obscured() {
        let raw = "Endpoint=sb://ns.example.net/;SharedAccessKeyName=send;SharedAccessKey=Zm9vYmFy==";
        let out = obscure_secrets(raw, &[]);
        assert!(out.contains("SharedAccessKey=***"));
        assert!(out.contains("SharedAccessKeyName=send"));
        assert!(!out.contains("Zm9vYmFy"));
    }

    #[test]
    fn empty_secrets_are_ignored() {
        assert_eq!(obscure_secrets("plain", &[String::new()]), "plain");
    }
}
