//! Shared helpers for the integration suites
#![allow(dead_code)]

use lockstep::{
    CommandContext, Key, MapCommand, MapStateMachine, MapUpdate, Output, SessionId, Timestamp,
    TransactionId, TransactionLog, UpdateResult,
};

/// Default test session
pub fn session() -> SessionId {
    SessionId::new(1)
}

/// Command context at `(index, timestamp_millis)` from the default session
pub fn ctx(index: u64, millis: u64) -> CommandContext {
    CommandContext::new(index, Timestamp::from_millis(millis), session(), index)
}

/// Command context from an explicit session
pub fn ctx_from(index: u64, millis: u64, session: SessionId) -> CommandContext {
    CommandContext::new(index, Timestamp::from_millis(millis), session, index)
}

pub fn put(key: &str, value: &[u8]) -> MapCommand {
    MapCommand::Put {
        key: Key::from(key),
        value: value.to_vec(),
        ttl_millis: 0,
    }
}

pub fn put_ttl(key: &str, value: &[u8], ttl_millis: u64) -> MapCommand {
    MapCommand::Put {
        key: Key::from(key),
        value: value.to_vec(),
        ttl_millis,
    }
}

pub fn get(key: &str) -> MapCommand {
    MapCommand::Get {
        key: Key::from(key),
    }
}

pub fn txn_put(key: &str, value: &[u8], expected_version: Option<u64>) -> MapUpdate {
    MapUpdate::Put {
        key: Key::from(key),
        value: value.to_vec(),
        expected_version,
    }
}

pub fn txn_log(id: u64, version: u64, updates: Vec<MapUpdate>) -> TransactionLog {
    TransactionLog {
        transaction_id: TransactionId::new(id),
        version,
        updates,
    }
}

/// Apply a command expected to yield `Output::Update`
pub fn apply_update(
    machine: &mut MapStateMachine,
    ctx: &CommandContext,
    command: MapCommand,
) -> UpdateResult {
    match machine.apply_command(ctx, command).unwrap() {
        Output::Update(result) => result,
        other => panic!("expected Output::Update, got {:?}", other),
    }
}

/// Query `Get` and unwrap the optional versioned value
pub fn query_get(machine: &MapStateMachine, key: &str) -> Option<lockstep::Versioned> {
    match machine.query(&get(key)).unwrap() {
        Output::Maybe(maybe) => maybe,
        other => panic!("expected Output::Maybe, got {:?}", other),
    }
}
