use file_pipeline::auth::{sign_token, Authenticator, HmacAuthenticator};

const SECRET: &str = "unit-test-secret";

#[test]
fn test_token_round_trip() {
    let auth = HmacAuthenticator::new(SECRET);
    let token = sign_token(SECRET, "user-42");

    let owner = auth.authenticate(&token).unwrap();
    assert_eq!(owner.id, "user-42");
}

#[test]
fn test_wrong_secret_is_rejected() {
    let auth = HmacAuthenticator::new(SECRET);
    let token = sign_token("some-other-secret", "user-42");
    assert!(auth.authenticate(&token).is_err());
}

#[test]
fn test_tampered_owner_is_rejected() {
    let auth = HmacAuthenticator::new(SECRET);
    let token = sign_token(SECRET, "user-42");

    // Swap the owner id but keep the signature
    let forged = token.replace("user-42", "user-1");
    assert!(auth.authenticate(&forged).is_err());
}

#[test]
fn test_tampered_signature_is_rejected() {
    let auth = HmacAuthenticator::new(SECRET);
    let mut token = sign_token(SECRET, "user-42");
    let flipped = if token.ends_with('A') { 'B' } else { 'A' };
    token.pop();
    token.push(flipped);
    assert!(auth.authenticate(&token).is_err());
}

#[test]
fn test_malformed_tokens_are_rejected() {
    let auth = HmacAuthenticator::new(SECRET);

    for credential in [
        "",
        "v1",
        "v1.",
        "v1..sig",
        "user-42",
        "v2.user-42.sig",
        "v1.user-42.!!!not-base64!!!",
    ] {
        assert!(
            auth.authenticate(credential).is_err(),
            "credential {credential:?} should be rejected"
        );
    }
}
