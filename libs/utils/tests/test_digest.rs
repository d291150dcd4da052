use hv_utils::digest::sha256_fields;

#[test]
fn test_sha256_fields_known_value() {
    // sha256(00 00 00 00 00 00 00 03 "abc")
    assert_eq!(
        sha256_fields(["abc"]),
        "c3494ca1a2cf8eeb8a11ded316fb55b83c3bbbedb6313cd50415251e5d09e12f"
    );

    // no fields hashes nothing
    assert_eq!(
        sha256_fields(Vec::<&str>::new()),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_sha256_fields_boundaries_matter() {
    assert_ne!(sha256_fields(["a", "b"]), sha256_fields(["ab"]));
    assert_ne!(sha256_fields(["a:b", "c"]), sha256_fields(["a", "b:c"]));
    assert_ne!(sha256_fields(["", "ab"]), sha256_fields(["ab", ""]));
}

#[test]
fn test_sha256_fields_is_lowercase_hex() {
    let digest = sha256_fields(["pizza", "boston", "10"]);

    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}
