use rpcgen::wire::{self, WireValue};
use rpcgen::{AppDefinition, GeneratorOptions, TargetKind, generate};
use tracing_test::traced_test;

const FIXTURE: &str = include_str!("fixtures/app_definition.json");

fn app() -> AppDefinition {
    AppDefinition::from_json_str(FIXTURE).unwrap()
}

fn options() -> GeneratorOptions {
    GeneratorOptions {
        client_name: "ExampleClient".into(),
        ..GeneratorOptions::default()
    }
}

#[test]
fn output_is_deterministic() {
    let app = app();
    for kind in [TargetKind::TypeScript, TargetKind::Rust] {
        let first = generate(&app, kind, &options()).unwrap();
        let second = generate(&app, kind, &options()).unwrap();
        assert_eq!(first, second, "{kind} output differs between runs");
    }
}

#[test]
fn self_referential_tree_is_emitted_once() {
    let app = app();
    let rust = generate(&app, TargetKind::Rust, &options()).unwrap().source;
    assert_eq!(rust.matches("pub struct BinaryTree {").count(), 1);
    assert!(rust.contains("pub left: Option<Box<BinaryTree>>,"));

    let ts = generate(&app, TargetKind::TypeScript, &options()).unwrap().source;
    assert_eq!(ts.matches("export interface BinaryTree {").count(), 1);
    assert!(ts.contains("left?: BinaryTree;"));
}

#[test]
#[traced_test]
fn websocket_procedures_are_skipped_with_a_warning() {
    let output = generate(&app(), TargetKind::TypeScript, &options()).unwrap();
    assert!(output.used_features.ws);
    assert!(output.used_features.sse);
    assert!(
        output
            .warnings
            .iter()
            .any(|warning| warning.path == "chat.connect" && warning.message.contains("WebSocket"))
    );
    assert!(logs_contain("WebSocket procedures are not supported at this time, skipping chat.connect"));
    // the procedure's types are still generated as plain models
    assert!(output.source.contains("export type Message = MessageText | MessageImage;"));
    assert!(!output.source.contains("ExampleClientChatService"));
}

#[test]
fn services_nest_by_dotted_path() {
    let app = app();
    let ts = generate(&app, TargetKind::TypeScript, &options()).unwrap().source;
    let root = ts.find("export class ExampleClient {").unwrap();
    let users = ts.find("export class ExampleClientUsersService {").unwrap();
    let settings = ts.find("export class ExampleClientUsersSettingsService {").unwrap();
    assert!(root < users && users < settings);
    assert!(ts.contains("readonly settings: ExampleClientUsersSettingsService;"));
    assert!(ts.contains("clientVersion: \"2.1.0\","));

    let rust = generate(&app, TargetKind::Rust, &options()).unwrap().source;
    assert!(rust.contains("pub struct ExampleClientUsersService {"));
    assert!(rust.contains("pub settings: ExampleClientUsersSettingsService,"));
    assert!(rust.contains("pub async fn get_settings(&self, params: UserParams) -> Result<UserSettings, RpcError> {"));
}

#[test]
fn client_version_override_wins() {
    let options = GeneratorOptions {
        client_version: Some("9.9.9".into()),
        ..options()
    };
    let ts = generate(&app(), TargetKind::TypeScript, &options).unwrap().source;
    assert!(ts.contains("clientVersion: \"9.9.9\","));
    assert!(!ts.contains("2.1.0"));
}

#[test]
fn fixture_payloads_round_trip_through_the_wire_codec() {
    let app = app();
    let user = app.definitions.get("User").unwrap();
    let text = r#"{"id":"1","name":"Ada","followers":"9007199254740993","createdAt":"2024-01-02T03:04:05.000Z","role":"ADMIN","email":null}"#;
    let value = wire::decode_json(text, user, &app.definitions).unwrap();
    let WireValue::Object(fields) = &value else {
        panic!("expected an object");
    };
    assert_eq!(fields.get("followers"), Some(&WireValue::Int(9007199254740993)));
    assert_eq!(fields.get("email"), Some(&WireValue::Null));
    assert!(!fields.contains_key("tree"));
    assert_eq!(wire::encode_json(&value, user, &app.definitions).unwrap(), text);

    let params = app.definitions.get("UserParams").unwrap();
    let query = wire::encode_query(&WireValue::object([("userId", WireValue::string("42"))]), params, &app.definitions).unwrap();
    assert_eq!(query, "userId=42");
}

#[test]
fn normalized_definition_reloads_identically() {
    let app = app();
    let normalized = serde_json::to_string(&app.to_json()).unwrap();
    let reloaded = AppDefinition::from_json_str(&normalized).unwrap();
    assert_eq!(reloaded, app);
}
