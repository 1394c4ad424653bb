#![cfg(feature = "serde")]

use ift::{Domain, Field, Space};

#[test]
fn roundtrip_field_json() {
    let d = Domain::regular([2, 2], &[0.5, 0.25]).unwrap();
    let f = Field::new(d, vec![1.0_f64, 2.0, 3.0, 4.0]).unwrap();
    let json = serde_json::to_string(&f).unwrap();
    let back: Field<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, f);
    assert_eq!(back.domain().spaces()[0].dvol(), 0.125);
}

#[test]
fn roundtrip_multi_domain() {
    let d = Domain::multi([
        ("xi", Domain::unstructured(3)),
        ("amp", Domain::new(vec![Space::harmonic([4], &[1.0]).unwrap()])),
    ])
    .unwrap();
    let json = serde_json::to_string(&d).unwrap();
    let back: Domain = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
    assert_eq!(back.keys().collect::<Vec<_>>(), ["amp", "xi"]);
}

#[test]
fn field_with_wrong_length_fails_to_deserialize() {
    let d = Domain::unstructured(3);
    let json = format!(
        "{{\"domain\":{},\"values\":[1.0,2.0]}}",
        serde_json::to_string(&d).unwrap()
    );
    assert!(serde_json::from_str::<Field<f64>>(&json).is_err());
}
