use super::*;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }
}

use test_helpers::parse_args;

#[test]
fn test_global_backend_flags_parse_after_subcommand() {
    let argv = [
        "promptpad",
        "models",
        "--backend",
        "koboldcpp",
        "--endpoint",
        "http://gpu:5001",
    ];
    let args = parse_args(&argv);

    assert!(matches!(args.command, Commands::Models));
    assert_eq!(args.backend, Some(BackendKind::KoboldCpp));
    assert_eq!(args.endpoint.as_deref(), Some("http://gpu:5001"));
}

#[test]
fn test_unknown_backend_is_rejected() {
    assert!(Args::try_parse_from(["promptpad", "-b", "gpt", "models"]).is_err());
}

#[test]
fn test_predict_flags_parsing() {
    let argv = [
        "promptpad",
        "predict",
        "3",
        "-n",
        "-1",
        "--stop",
        "[\"\\n\"]",
        "-t",
        "0.9",
    ];
    match parse_args(&argv).command {
        Commands::Predict {
            id,
            n_predict,
            stop,
            temperature,
        } => {
            assert_eq!(id, 3);
            assert_eq!(n_predict, Some(-1));
            assert_eq!(stop.as_deref(), Some("[\"\\n\"]"));
            assert_eq!(temperature, Some(0.9));
        }
        _ => panic!("expected predict subcommand for argv={argv:?}"),
    }
}

#[test]
fn test_new_session_name_collects_words() {
    match parse_args(&["promptpad", "new", "space", "opera"]).command {
        Commands::New { name } => assert_eq!(name.join(" "), "space opera"),
        _ => panic!("expected new subcommand"),
    }
}

#[test]
fn test_set_without_key_lists_settings() {
    match parse_args(&["promptpad", "set"]).command {
        Commands::Set { key, value } => {
            assert_eq!(key, None);
            assert!(value.is_empty());
        }
        _ => panic!("expected set subcommand"),
    }
}

#[test]
fn test_set_default_model_keeps_multi_word_value() {
    match parse_args(&["promptpad", "set", "default-model", "hosted", "a/b", "c"]).command {
        Commands::Set { key, value } => {
            assert_eq!(key.as_deref(), Some("default-model"));
            assert_eq!(value, vec!["hosted", "a/b", "c"]);
        }
        _ => panic!("expected set subcommand"),
    }
}

#[test]
fn test_overrides_switching_kind_resets_endpoint() {
    let base = BackendConfig::new(BackendKind::LlamaCpp, "http://10.0.0.5:8080").with_model("m");
    let overrides = BackendOverrides {
        kind: Some(BackendKind::KoboldCpp),
        ..Default::default()
    };
    let applied = overrides.apply(base.clone());
    assert_eq!(applied.kind, BackendKind::KoboldCpp);
    assert_eq!(applied.endpoint, BackendKind::KoboldCpp.default_endpoint());
    assert_eq!(applied.model.as_deref(), Some("m"));

    let same_kind = BackendOverrides {
        kind: Some(BackendKind::LlamaCpp),
        ..Default::default()
    };
    assert_eq!(same_kind.apply(base.clone()), base);

    let explicit = BackendOverrides {
        kind: Some(BackendKind::Hosted),
        endpoint: Some("https://proxy.example/api".into()),
        model: Some("x".into()),
    };
    let applied = explicit.apply(base);
    assert_eq!(applied.endpoint, "https://proxy.example/api");
    assert_eq!(applied.model.as_deref(), Some("x"));
}

#[test]
fn test_watch_takes_session_and_file() {
    match parse_args(&["promptpad", "watch", "2", "draft.txt", "-b", "llamacpp"]).command {
        Commands::Watch { id, file } => {
            assert_eq!(id, 2);
            assert_eq!(file, PathBuf::from("draft.txt"));
        }
        _ => panic!("expected watch subcommand"),
    }
}
