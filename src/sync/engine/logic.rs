use crate::error::RemoteError;
use crate::sync::engine::state::MachineState;
use crate::sync::engine::types::{SyncCommand, SyncState};

fn move_to(state: &mut MachineState, next: SyncState, cmds: &mut Vec<SyncCommand>) {
    if state.state == next {
        return;
    }
    log::info!("[SYNC] state {} -> {}", state.state, next);
    state.state = next;
    cmds.push(SyncCommand::Publish {
        state: next,
        last_error: state.last_error.clone(),
    });
}

fn start_sync(state: &mut MachineState, cmds: &mut Vec<SyncCommand>) {
    move_to(state, SyncState::Syncing, cmds);
    cmds.push(SyncCommand::RunSync);
}

pub fn on_sync_requested(state: &mut MachineState, _now: u64) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    match state.state {
        // an explicit request skips the remaining backoff
        SyncState::Idle | SyncState::Cooling => start_sync(state, &mut cmds),
        other => log::debug!("[SYNC] sync requested while {}, ignored", other),
    }
    cmds
}

pub fn on_tick(state: &mut MachineState, now: u64) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    match state.state {
        SyncState::Idle => start_sync(state, &mut cmds),
        SyncState::Cooling => match state.cooling_until {
            Some(until) if now < until => {
                log::debug!("[SCHED] cooling for another {} ms, tick skipped", until - now);
            }
            _ => {
                state.cooling_until = None;
                move_to(state, SyncState::Idle, &mut cmds);
                start_sync(state, &mut cmds);
            }
        },
        other => log::trace!("[SCHED] tick while {}, skipped", other),
    }
    cmds
}

pub fn on_sync_succeeded(state: &mut MachineState) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    state.reset_backoff();
    state.last_error = None;
    if matches!(state.state, SyncState::Syncing | SyncState::Cooling) {
        move_to(state, SyncState::Idle, &mut cmds);
    }
    cmds
}

pub fn on_sync_failed(state: &mut MachineState, now: u64, error: &RemoteError) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    state.last_error = Some(error.to_string());

    if *error == RemoteError::NotAuthenticated {
        state.authenticated = false;
        cmds.push(SyncCommand::StopAutoSync);
        let next = state.resting_state();
        move_to(state, next, &mut cmds);
        return cmds;
    }

    state.consecutive_failures += 1;
    if matches!(state.state, SyncState::Syncing | SyncState::Idle | SyncState::Cooling) {
        let backoff = state.next_backoff_ms;
        state.cooling_until = Some(now.saturating_add(backoff));
        state.next_backoff_ms = backoff.saturating_mul(2).min(state.backoff_max_ms);
        log::warn!(
            "[SYNC] {} (failure #{}), cooling for {} ms",
            error,
            state.consecutive_failures,
            backoff
        );
        if state.state == SyncState::Cooling {
            cmds.push(SyncCommand::Publish {
                state: SyncState::Cooling,
                last_error: state.last_error.clone(),
            });
        } else {
            move_to(state, SyncState::Cooling, &mut cmds);
        }
    }
    cmds
}

pub fn on_sync_aborted(state: &mut MachineState, reason: String) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    log::error!("[SYNC] run aborted: {}", reason);
    state.last_error = Some(reason);
    if state.state == SyncState::Syncing {
        let next = state.resting_state();
        move_to(state, next, &mut cmds);
    }
    cmds
}

pub fn on_went_offline(state: &mut MachineState) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    state.online = false;
    move_to(state, SyncState::Offline, &mut cmds);
    cmds
}

pub fn on_went_online(state: &mut MachineState) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    state.online = true;
    if state.state == SyncState::Offline {
        let next = state.resting_state();
        move_to(state, next, &mut cmds);
        if state.authenticated {
            cmds.push(SyncCommand::DrainQueue);
        }
    }
    cmds
}

pub fn on_signed_in(state: &mut MachineState) -> Vec<SyncCommand> {
    let mut cmds = Vec::new();
    state.authenticated = true;
    state.last_error = None;
    state.reset_backoff();
    let next = state.resting_state();
    move_to(state, next, &mut cmds);
    cmds
}

pub fn on_signed_out(state: &mut MachineState) -> Vec<SyncCommand> {
    let mut cmds = vec![SyncCommand::StopAutoSync];
    state.authenticated = false;
    state.last_error = None;
    state.reset_backoff();
    let next = state.resting_state();
    move_to(state, next, &mut cmds);
    cmds
}
