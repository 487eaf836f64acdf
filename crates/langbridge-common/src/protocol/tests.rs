//! Tests for the protocol module
//!
//! These tests verify type-tag naming, the argument wire shape, class
//! descriptors and error-kind mapping.

#[cfg(test)]
mod tests {
    use crate::protocol::*;

    // ========================================================================
    // TypeTag Tests
    // ========================================================================

    #[test]
    fn test_type_tag_known_names() {
        for (name, tag) in [
            ("int", TypeTag::Int),
            ("string", TypeTag::String),
            ("bool", TypeTag::Bool),
            ("float", TypeTag::Float),
            ("null", TypeTag::Null),
            ("any", TypeTag::Any),
            ("void", TypeTag::Void),
        ] {
            assert_eq!(TypeTag::from(name), tag);
            assert_eq!(tag.to_string(), name);
        }
    }

    #[test]
    fn test_type_tag_custom_name_is_preserved() {
        let tag = TypeTag::from("Point");
        assert_eq!(tag, TypeTag::Custom("Point".to_string()));
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"Point\"");
    }

    #[test]
    fn test_type_tag_is_case_sensitive() {
        assert_eq!(TypeTag::from("Int"), TypeTag::Custom("Int".to_string()));
    }

    #[test]
    fn test_any_accepts_every_tag() {
        assert!(TypeTag::Any.accepts(&TypeTag::Int));
        assert!(TypeTag::Any.accepts(&TypeTag::Custom("Point".to_string())));
        assert!(TypeTag::Int.accepts(&TypeTag::Int));
        assert!(!TypeTag::Int.accepts(&TypeTag::Float));
        assert!(!TypeTag::Int.accepts(&TypeTag::Any));
    }

    // ========================================================================
    // Argument Tests
    // ========================================================================

    #[test]
    fn test_argument_serializes_as_single_entry_map() {
        let json = serde_json::to_string(&Argument::from(42)).unwrap();
        assert_eq!(json, r#"{"42":"int"}"#);

        let json = serde_json::to_string(&Argument::from(true)).unwrap();
        assert_eq!(json, r#"{"true":"bool"}"#);
    }

    #[test]
    fn test_argument_deserialize() {
        let arg: Argument = serde_json::from_str(r#"{"hello":"string"}"#).unwrap();
        assert_eq!(arg, Argument::new("hello", TypeTag::String));
    }

    #[test]
    fn test_argument_rejects_empty_and_multi_entry_maps() {
        assert!(serde_json::from_str::<Argument>("{}").is_err());
        assert!(serde_json::from_str::<Argument>(r#"{"1":"int","2":"int"}"#).is_err());
        assert!(serde_json::from_str::<Argument>(r#"["1","int"]"#).is_err());
    }

    #[test]
    fn test_argument_parse() {
        assert_eq!(Argument::from(7).parse::<i64>().unwrap(), 7);
        assert_eq!(Argument::from(2.5).parse::<f64>().unwrap(), 2.5);

        let err = Argument::from("seven").parse::<i64>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_argument_retagged_keeps_value() {
        let arg = Argument::from(3).retagged(TypeTag::Any);
        assert_eq!(arg.value, "3");
        assert_eq!(arg.tag, TypeTag::Any);
    }

    // ========================================================================
    // ClassDescriptor Tests
    // ========================================================================

    #[test]
    fn test_class_descriptor_wire_shape() {
        let json = r#"{
            "name": "Calculator",
            "constructors": [[], ["int"]],
            "methods": [
                {"name": "add", "parameters": ["int", "int"], "return": "int"},
                {"name": "add", "parameters": ["float", "float"], "return": "float"},
                {"name": "reset", "return": "void"}
            ]
        }"#;

        let descriptor: ClassDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.name, "Calculator");
        assert_eq!(descriptor.constructors.len(), 2);
        assert!(descriptor.constructors[0].parameters.is_empty());
        assert_eq!(descriptor.methods[2].return_type, TypeTag::Void);
        assert!(descriptor.methods[2].parameters.is_empty());
    }

    #[test]
    fn test_class_descriptor_missing_lists_default_to_empty() {
        let descriptor: ClassDescriptor = serde_json::from_str(r#"{"name":"Empty"}"#).unwrap();
        assert!(descriptor.constructors.is_empty());
        assert!(descriptor.methods.is_empty());
    }

    #[test]
    fn test_overloads_in_registration_order() {
        let descriptor = ClassDescriptor::new("Calc")
            .with_method("add", [TypeTag::Int, TypeTag::Int], TypeTag::Int)
            .with_method("reset", [], TypeTag::Void)
            .with_method("add", [TypeTag::Float, TypeTag::Float], TypeTag::Float);

        let returns: Vec<_> = descriptor
            .overloads("add")
            .map(|m| m.return_type.clone())
            .collect();
        assert_eq!(returns, vec![TypeTag::Int, TypeTag::Float]);
        assert_eq!(descriptor.overloads("missing").count(), 0);
    }

    // ========================================================================
    // ReturnValue Tests
    // ========================================================================

    #[test]
    fn test_return_value_from_native() {
        let value = ReturnValue::from("this is a string");
        assert_eq!(value.tag, TypeTag::String);
        assert_eq!(value.value, "this is a string");

        let value = ReturnValue::from(5i64);
        assert_eq!(value.parse::<i64>().unwrap(), 5);
    }

    #[test]
    fn test_void_return_value() {
        let value = ReturnValue::void();
        assert!(value.is_void());
        assert!(value.value.is_empty());
    }

    // ========================================================================
    // Error Tests
    // ========================================================================

    #[test]
    fn test_remote_error_round_trip_text() {
        let remote = RemoteError::new(ErrorKind::UnknownClass, "unknown class 'Dog'");
        let text = remote.to_string();
        assert_eq!(text, "UnknownClass: unknown class 'Dog'");
        assert_eq!(RemoteError::parse(&text), remote);
    }

    #[test]
    fn test_remote_error_without_kind_prefix() {
        let remote = RemoteError::parse("something broke: badly");
        assert_eq!(remote.kind, ErrorKind::Other);
        assert_eq!(remote.message, "something broke: badly");
    }

    #[test]
    fn test_bridge_error_to_remote_uses_kind() {
        let err = BridgeError::UnknownHandle("calc".to_string());
        let remote = err.to_remote();
        assert_eq!(remote.kind, ErrorKind::UnknownHandle);
        assert_eq!(remote.message, "unknown object handle 'calc'");
    }

    #[test]
    fn test_no_match_message_lists_arguments_and_candidates() {
        let err = BridgeError::from(NoMatchError::new(
            vec![Argument::from(1.5)],
            vec![vec![TypeTag::Int], vec![TypeTag::String]],
        ));
        let text = err.to_string();
        assert!(text.contains(r#"[{"1.5":"float"}]"#));
        assert!(text.contains(r#"[["int"],["string"]]"#));
        assert_eq!(err.kind(), ErrorKind::NoMatch);
    }

    #[test]
    fn test_remote_connection_lost_lifts_to_variant() {
        let remote = RemoteError::new(ErrorKind::ConnectionLost, "owner went away");
        assert!(matches!(
            BridgeError::from(remote),
            BridgeError::ConnectionLost(msg) if msg == "owner went away"
        ));

        let remote = RemoteError::new(ErrorKind::NoMatch, "nope");
        assert!(matches!(BridgeError::from(remote), BridgeError::Remote(_)));
    }

    #[test]
    fn test_remote_error_is_preserved_through_to_remote() {
        let remote = RemoteError::new(ErrorKind::DuplicateClass, "class 'A' is already registered");
        let err = BridgeError::Remote(remote.clone());
        assert_eq!(err.to_remote(), remote);
        assert_eq!(err.to_string(), remote.to_string());
    }
}
