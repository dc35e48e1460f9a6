//! Room and session tests over the in-memory transport.
//!
//! Run with: `cargo test -p jutland-network --test room_tests`

use jutland_core::{
    Faction, GameSetup, Hex, MemoryStore, MovementService, ShipCatalog, SpecialRulesEngine,
    TerrainMap,
};
use jutland_network::{
    memory_transport, ActionContext, ActionError, ActionHandler, Envelope, Hub, HubConfig,
    HubEventSink, HubHandle, MemoryClient, MessageType, RejectActions, Session,
};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn connect(hub: &HubHandle, handler: Arc<dyn ActionHandler>, user: &str) -> MemoryClient {
    connect_with_capacity(hub, handler, user, 64)
}

fn connect_with_capacity(
    hub: &HubHandle,
    handler: Arc<dyn ActionHandler>,
    user: &str,
    capacity: usize,
) -> MemoryClient {
    let (client, source, sink) = memory_transport(capacity);
    let session = Session::new(hub.clone(), handler, Some(user.to_string()));
    tokio::spawn(session.run(source, sink));
    client
}

async fn join(client: &mut MemoryClient, game_id: &str) {
    client.send_envelope(&Envelope::join_game(game_id)).await.unwrap();
    let note = client.recv_kind(MessageType::Notification).await.unwrap();
    assert_eq!(note.game_id.as_deref(), Some(game_id));
}

fn hex(label: &str) -> Hex {
    label.parse().unwrap()
}

// ============================================================================
// Broadcast ordering
// ============================================================================

#[tokio::test]
async fn test_room_broadcast_order_and_late_joiner() {
    let hub = Hub::spawn(HubConfig::default());
    let handler: Arc<dyn ActionHandler> = Arc::new(RejectActions);

    let mut members = Vec::new();
    for user in ["lutjens", "tovey", "somerville"] {
        let mut client = connect(&hub, handler.clone(), user);
        join(&mut client, "rheinubung").await;
        members.push(client);
    }

    for seq in 0..5 {
        hub.broadcast_room(
            "rheinubung",
            Envelope::game_event("rheinubung", "contact_report", json!({ "seq": seq })),
        )
        .await
        .unwrap();
    }

    let mut late = connect(&hub, handler.clone(), "wake-walker");
    join(&mut late, "rheinubung").await;
    hub.broadcast_room(
        "rheinubung",
        Envelope::game_event("rheinubung", "marker", Value::Null),
    )
    .await
    .unwrap();

    for client in members.iter_mut() {
        for seq in 0..5 {
            let env = client.recv_kind(MessageType::GameEvent).await.unwrap();
            assert_eq!(env.event_name(), Some("contact_report"));
            assert_eq!(env.data["seq"], seq);
        }
        let marker = client.recv_kind(MessageType::GameEvent).await.unwrap();
        assert_eq!(marker.event_name(), Some("marker"));
    }

    let first = late.recv_kind(MessageType::GameEvent).await.unwrap();
    assert_eq!(first.event_name(), Some("marker"));
    assert_eq!(hub.stats().await.unwrap().room_size("rheinubung"), 4);
}

#[tokio::test]
async fn test_slow_session_is_dropped_without_stalling_the_room() {
    let hub = Hub::spawn(HubConfig {
        outbound_capacity: 8,
        ..HubConfig::default()
    });
    let handler: Arc<dyn ActionHandler> = Arc::new(RejectActions);

    let mut fast_a = connect(&hub, handler.clone(), "lutjens");
    let mut fast_b = connect(&hub, handler.clone(), "tovey");
    // Transport holds a single frame and this client never reads it
    let mut slow = connect_with_capacity(&hub, handler.clone(), "somerville", 1);
    join(&mut fast_a, "g1").await;
    join(&mut fast_b, "g1").await;
    slow.send_envelope(&Envelope::join_game("g1")).await.unwrap();
    while hub.stats().await.unwrap().room_size("g1") < 3 {
        tokio::task::yield_now().await;
    }

    for seq in 0..12 {
        hub.broadcast_room("g1", Envelope::game_event("g1", "tick", json!({ "seq": seq })))
            .await
            .unwrap();
        for client in [&mut fast_a, &mut fast_b] {
            let env = client.recv_kind(MessageType::GameEvent).await.unwrap();
            assert_eq!(env.data["seq"], seq);
        }
    }

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.room_size("g1"), 2);
}

// ============================================================================
// Control messages
// ============================================================================

#[tokio::test]
async fn test_chat_is_scoped_to_the_room() {
    let hub = Hub::spawn(HubConfig::default());
    let handler: Arc<dyn ActionHandler> = Arc::new(RejectActions);
    let mut holland = connect(&hub, handler.clone(), "holland");
    let mut tovey = connect(&hub, handler.clone(), "tovey");

    holland
        .send_envelope(&Envelope::chat_message("Hood engaging"))
        .await
        .unwrap();
    let err = holland.recv_kind(MessageType::Error).await.unwrap();
    assert_eq!(err.data["code"], "not_in_game");

    join(&mut holland, "denmark-strait").await;
    join(&mut tovey, "denmark-strait").await;
    holland
        .send_envelope(&Envelope::chat_message("Hood engaging"))
        .await
        .unwrap();

    for client in [&mut holland, &mut tovey] {
        let env = client.recv_kind(MessageType::GameEvent).await.unwrap();
        assert_eq!(env.event_name(), Some("chat_message"));
        assert_eq!(env.data["message"], "Hood engaging");
        assert_eq!(env.data["user_id"], "holland");
    }
}

#[tokio::test]
async fn test_unknown_type_keeps_session_open() {
    let hub = Hub::spawn(HubConfig::default());
    let mut client = connect(&hub, Arc::new(RejectActions), "tovey");

    client
        .send(jutland_network::Frame::Text(r#"{"type":"scuttle","data":{}}"#.to_string()))
        .await
        .unwrap();
    let err = client.recv_kind(MessageType::Error).await.unwrap();
    assert_eq!(err.data["code"], "unsupported_type");

    // Outbound-only types are not accepted from clients either
    client
        .send_envelope(&Envelope::notification("spoofed"))
        .await
        .unwrap();
    assert_eq!(
        client.recv_kind(MessageType::Error).await.unwrap().data["code"],
        "unsupported_type"
    );

    client.send_envelope(&Envelope::ping()).await.unwrap();
    assert!(client.recv_kind(MessageType::Pong).await.is_some());
    assert_eq!(hub.stats().await.unwrap().sessions, 1);
}

#[tokio::test]
async fn test_leave_game_stops_room_delivery() {
    let hub = Hub::spawn(HubConfig::default());
    let mut client = connect(&hub, Arc::new(RejectActions), "tovey");
    join(&mut client, "g1").await;

    client.send_envelope(&Envelope::leave_game()).await.unwrap();
    let note = client.recv_kind(MessageType::Notification).await.unwrap();
    assert_eq!(note.game_id.as_deref(), Some("g1"));
    assert!(hub.stats().await.unwrap().rooms.is_empty());

    hub.broadcast_room("g1", Envelope::game_event("g1", "tick", Value::Null))
        .await
        .unwrap();
    hub.broadcast_all(Envelope::notification("server restarting"))
        .await
        .unwrap();
    let next = client.recv_envelope().await.unwrap();
    assert_eq!(next.data["message"], "server restarting");
}

// ============================================================================
// Game actions through the core
// ============================================================================

struct MoveHandler {
    movement: MovementService,
}

impl ActionHandler for MoveHandler {
    fn handle(&self, _ctx: &ActionContext, payload: Value) -> Result<Value, ActionError> {
        let unit_id = payload["unit_id"]
            .as_u64()
            .ok_or_else(|| ActionError::new("invalid_payload", "unit_id required"))?;
        let to: Hex = payload["to"]
            .as_str()
            .and_then(|label| label.parse().ok())
            .ok_or_else(|| ActionError::new("invalid_payload", "to must be a hex"))?;
        let record = self.movement.execute_move(unit_id, to)?;
        serde_json::to_value(record).map_err(|err| ActionError::new("internal", err.to_string()))
    }
}

#[tokio::test]
async fn test_move_action_reaches_the_room() {
    let hub = Hub::spawn(HubConfig::default());
    let store = Arc::new(MemoryStore::new());
    let setup = GameSetup::new(store.clone(), Arc::new(ShipCatalog::builtin()));
    setup.create_game("g1", "Rheinübung").unwrap();
    setup.seat_player("g1", "lutjens", Faction::German).unwrap();
    let bismarck = setup
        .deploy_ship("g1", "Bismarck", hex("K15"), &mut SpecialRulesEngine::new())
        .unwrap();

    let movement = MovementService::new(
        store,
        Arc::new(TerrainMap::open_sea(26, 30)),
        Arc::new(HubEventSink::new(hub.clone())),
    );
    let handler: Arc<dyn ActionHandler> = Arc::new(MoveHandler { movement });

    let mut lutjens = connect(&hub, handler.clone(), "lutjens");
    let mut observer = connect(&hub, handler.clone(), "raeder");
    join(&mut lutjens, "g1").await;
    join(&mut observer, "g1").await;

    lutjens
        .send_envelope(&Envelope::game_action(json!({ "unit_id": bismarck.id, "to": "K16" })))
        .await
        .unwrap();
    let update = lutjens.recv_kind(MessageType::GameUpdate).await.unwrap();
    assert_eq!(update.game_id.as_deref(), Some("g1"));
    assert_eq!(update.data["to"], "K16");

    let event = observer.recv_kind(MessageType::GameEvent).await.unwrap();
    assert_eq!(event.event_name(), Some("unit_moved"));
    assert_eq!(event.data["unit_id"], bismarck.id);

    lutjens
        .send_envelope(&Envelope::game_action(json!({ "unit_id": bismarck.id, "to": "K17" })))
        .await
        .unwrap();
    let err = lutjens.recv_kind(MessageType::Error).await.unwrap();
    assert_eq!(err.data["code"], "movement_forbidden_this_turn");
}
