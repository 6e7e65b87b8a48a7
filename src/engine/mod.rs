//! Audio Engine Module
//!
//! Control-context core of the transport and routing engine:
//! - Transport state machine and playback position
//! - Region scheduling onto source nodes
//! - Graph topology for tracks, buses and sends
//! - Safe mutation, loop jumps and startup retry
//!
//! `AudioEngine` is the single entry point. It owns an explicit
//! `EngineState` that is rebuilt on `load_project` and diffed on
//! `update_project`; nothing here is global.

pub mod clock;
pub mod cycle;
pub mod effects;
pub mod mutation;
pub mod render;
pub mod scheduler;
pub mod solo;
pub mod sources;
pub mod topology;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cycle::{CycleController, CycleRegion};
pub use mutation::{EngineStatus, StartupRetry, StartupState};
pub use render::{OfflineRenderEngine, RenderEngine};
pub use scheduler::{RegionScheduler, ScheduleReport, SkipReason, SkippedRegion};
pub use sources::{InMemorySourceLoader, SourceInfo, SourceLoader, WavSourceLoader};
pub use topology::{BusNodes, GraphTopology, SendStatus, TrackNodes};
pub use transport::{MusicalPosition, PlaybackPosition, TransportClock, TransportState};

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{NodeGraph, ScheduledSegment};
use crate::model::{
    Bus, BusId, EffectId, EffectStage, EqSettings, ProjectDelta, ProjectSnapshot, Send, TimePitch,
    Track, TrackId,
};

// ============================================================================
// Engine State
// ============================================================================

/// Everything derived from one project snapshot
#[derive(Debug)]
pub struct EngineState {
    project: ProjectSnapshot,
    transport: TransportClock,
    topology: GraphTopology,
    schedules: HashMap<TrackId, ScheduleReport>,
    max_eq_gain_db: f32,
}

impl EngineState {
    /// Build the graph mirror for a project
    ///
    /// Buses are created before tracks so sends resolve immediately; a send
    /// naming a bus the project does not contain stays deferred.
    pub fn build(project: ProjectSnapshot, config: &EngineConfig) -> Result<Self> {
        let mut state = Self {
            transport: TransportClock::new(project.tempo, project.time_signature),
            topology: GraphTopology::new(project.master_volume),
            schedules: HashMap::new(),
            max_eq_gain_db: config.max_eq_gain_db,
            project: ProjectSnapshot::default(),
        };

        for bus in &project.buses {
            state.topology.create_bus_nodes(bus)?;
        }
        for track in &project.tracks {
            state.topology.create_track_nodes(track)?;
        }
        state.project = project;

        let ids: Vec<TrackId> = state.project.tracks.iter().map(|t| t.id).collect();
        for id in ids {
            state.sync_track(id)?;
        }
        state.apply_solo()?;
        state.sync_buses()?;
        Ok(state)
    }

    pub fn project(&self) -> &ProjectSnapshot {
        &self.project
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    pub fn topology(&self) -> &GraphTopology {
        &self.topology
    }

    /// Outcome of the most recent scheduling pass for a track
    pub fn schedule(&self, track: TrackId) -> Option<&ScheduleReport> {
        self.schedules.get(&track)
    }

    /// Push a track's mixer record to its gain, pan, EQ and time/pitch stages
    fn sync_track(&mut self, id: TrackId) -> Result<()> {
        let track = self
            .project
            .track(id)
            .ok_or(EngineError::UnknownTrack { id })?;
        let eq = clamp_eq(track.mixer.eq, self.max_eq_gain_db);
        self.topology.set_track_volume(id, track.mixer.volume)?;
        self.topology.set_track_pan(id, track.mixer.pan)?;
        self.topology.set_track_eq(id, eq)?;
        self.topology.set_track_time_pitch(id, track.time_pitch)
    }

    /// Recompute effective mutes and apply them to every gain stage
    fn apply_solo(&mut self) -> Result<()> {
        for (id, muted) in solo::resolve_tracks(&self.project.tracks) {
            self.topology.set_track_muted(id, muted)?;
        }
        Ok(())
    }

    fn sync_buses(&mut self) -> Result<()> {
        let mutes = solo::resolve_buses(&self.project.buses);
        for bus in &self.project.buses {
            let muted = mutes.get(&bus.id).copied().unwrap_or(bus.mute);
            self.topology.set_bus_output(bus.id, bus.output_gain, muted)?;
            self.topology.set_bus_input_gain(bus.id, bus.input_gain)?;
        }
        Ok(())
    }

    /// Apply the topology part of a delta and adopt the new snapshot
    fn apply_structural(&mut self, delta: &ProjectDelta, next: ProjectSnapshot) -> Result<()> {
        for id in &delta.tracks_removed {
            self.topology.remove_track_nodes(*id);
            self.schedules.remove(id);
        }
        // Sends still listed by tracks stay deferred until the bus returns
        for id in &delta.buses_removed {
            self.topology.detach_bus_nodes(*id);
        }
        for bus in next.buses.iter().filter(|b| delta.buses_added.contains(&b.id)) {
            self.topology.create_bus_nodes(bus)?;
        }
        for change in delta.buses_changed.iter().filter(|b| b.chain_changed) {
            if let Some(bus) = next.bus(change.id) {
                self.topology.rebuild_bus_effect_chain(bus)?;
            }
        }
        for track in next.tracks.iter().filter(|t| delta.tracks_added.contains(&t.id)) {
            self.topology.create_track_nodes(track)?;
        }
        for change in delta.tracks_changed.iter().filter(|t| t.sends.is_structural()) {
            for bus in &change.sends.removed {
                if let Err(e) = self.topology.remove_send(change.id, *bus) {
                    debug!("[ENGINE] Send already gone: {}", e);
                }
            }
            for send in &change.sends.added {
                self.topology
                    .wire_send(change.id, send.bus, send.level, send.pre_fader)?;
            }
        }
        self.project = next;
        Ok(())
    }
}

fn clamp_eq(eq: EqSettings, max_db: f32) -> EqSettings {
    EqSettings {
        low_db: eq.low_db.clamp(-max_db, max_db),
        mid_db: eq.mid_db.clamp(-max_db, max_db),
        high_db: eq.high_db.clamp(-max_db, max_db),
    }
}

// ============================================================================
// Audio Engine
// ============================================================================

/// Transport and routing engine driven from a single control context
///
/// Every call runs to completion on the caller's thread. `tick` must be
/// called periodically (see `EngineConfig::tick_interval`) to advance the
/// position, check the cycle boundary and retry a failed engine start.
pub struct AudioEngine {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    render: Box<dyn RenderEngine>,
    loader: Box<dyn SourceLoader>,
    state: EngineState,
    cycle: CycleController,
    startup: StartupRetry,
    frozen: bool,
}

impl AudioEngine {
    /// Create an engine with an empty project; the render engine is started
    /// by `load_project`
    pub fn new(
        config: EngineConfig,
        clock: impl Clock + 'static,
        render: impl RenderEngine + 'static,
        loader: impl SourceLoader + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let state = EngineState::build(ProjectSnapshot::default(), &config)?;
        Ok(Self {
            cycle: CycleController::new(config.cycle_tolerance, config.cycle_cooldown),
            startup: StartupRetry::new(config.startup_retry_delay, config.startup_max_attempts),
            clock: Box::new(clock),
            render: Box::new(render),
            loader: Box::new(loader),
            state,
            frozen: false,
            config,
        })
    }

    /// Replace the engine state with one built from `project`
    ///
    /// The cycle region and transport position are reset. A render engine
    /// that fails to start is retried from the tick.
    pub fn load_project(&mut self, project: ProjectSnapshot) -> Result<()> {
        let state = EngineState::build(project, &self.config)?;
        let now = self.clock.now();

        self.frozen = true;
        if self.render.is_running() {
            self.render.pause();
        }
        self.state.topology.stop_all_players();
        info!(
            "[ENGINE] Loaded project '{}': {} track(s), {} bus(es)",
            state.project.name,
            state.project.tracks.len(),
            state.project.buses.len()
        );
        self.state = state;
        self.cycle = CycleController::new(self.config.cycle_tolerance, self.config.cycle_cooldown);
        self.startup.reset();
        self.try_start_render(now, TransportState::Stopped);
        self.frozen = false;
        Ok(())
    }

    /// Diff `snapshot` against the current project and apply the changes
    ///
    /// Structural changes go through one safe mutation; level and parameter
    /// changes are applied in place. Tracks whose regions changed are
    /// rescheduled when no structural change already did so.
    pub fn update_project(&mut self, snapshot: ProjectSnapshot) -> Result<ProjectDelta> {
        let delta = ProjectDelta::between(&self.state.project, &snapshot);
        if delta.is_empty() {
            self.state.project = snapshot;
            return Ok(delta);
        }

        let structural = delta.is_structural();
        if structural {
            self.safe_mutation("update_project", |state| {
                state.apply_structural(&delta, snapshot)
            })?;
        } else {
            self.state.project = snapshot;
        }

        self.apply_level_changes(&delta)?;
        if delta.tempo_changed {
            let (tempo, signature) = (self.state.project.tempo, self.state.project.time_signature);
            self.state.transport.set_tempo(tempo, signature);
        }

        if !structural && self.state.transport.is_running() {
            let now = self.clock.now();
            let position = self.state.transport.tick(now).time;
            let changed: Vec<TrackId> = delta
                .tracks_changed
                .iter()
                .filter(|t| !t.regions.is_empty() || t.time_pitch_changed)
                .map(|t| t.id)
                .collect();
            for id in changed {
                self.reschedule_track(id, position, now);
            }
        }

        debug!("[ENGINE] Applied project update: {:?}", delta);
        Ok(delta)
    }

    fn apply_level_changes(&mut self, delta: &ProjectDelta) -> Result<()> {
        let state = &mut self.state;
        for id in &delta.tracks_added {
            state.sync_track(*id)?;
        }
        for change in &delta.tracks_changed {
            if change.mixer_changed || change.time_pitch_changed {
                state.sync_track(change.id)?;
            }
            for send in &change.sends.level_changed {
                state
                    .topology
                    .update_send_level(change.id, send.bus, send.level)?;
            }
        }
        for change in &delta.buses_changed {
            let Some(bus) = state.project.bus(change.id) else {
                continue;
            };
            for effect in &change.parameters_changed {
                if let Some(stage) = bus.effect(*effect) {
                    state.topology.apply_effect_parameters(bus.id, stage)?;
                }
            }
        }
        if delta.master_changed {
            state.topology.set_master_volume(state.project.master_volume);
        }
        state.apply_solo()?;
        state.sync_buses()
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start playback from the current position
    ///
    /// If the render engine is down a start is attempted first; while a
    /// retry is pending the request is remembered and honoured on success.
    pub fn play(&mut self) -> Result<()> {
        self.start_transport(TransportState::Playing)
    }

    /// Start recording, punching in if already playing
    pub fn record(&mut self) -> Result<()> {
        self.start_transport(TransportState::Recording)
    }

    fn start_transport(&mut self, target: TransportState) -> Result<()> {
        let now = self.clock.now();
        if self.startup.is_waiting() {
            self.startup.set_resume(target);
            info!("[ENGINE] {} deferred until the render engine starts", target);
            return Ok(());
        }
        if !self.render.is_running() {
            self.startup.reset();
            if !self.try_start_render(now, target) {
                return self.check_engine();
            }
        }

        let was_running = self.state.transport.is_running();
        let changed = match target {
            TransportState::Recording => self.state.transport.record(now),
            _ => self.state.transport.play(now),
        };
        if changed && !was_running {
            self.begin_playback(now);
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        let now = self.clock.now();
        if self.state.transport.pause(now) {
            self.state.topology.stop_all_players();
        }
        self.startup.set_resume(TransportState::Paused);
    }

    /// Stop without rewinding; every source is stopped before returning
    pub fn stop(&mut self) {
        let now = self.clock.now();
        if self.state.transport.stop(now) {
            self.state.topology.stop_all_players();
        }
        self.startup.set_resume(TransportState::Stopped);
    }

    pub fn stop_recording(&mut self) {
        let now = self.clock.now();
        if self.state.transport.stop_recording(now) {
            self.state.topology.stop_all_players();
        }
    }

    /// Move the playhead; a running transport relocates without a restart
    pub fn seek(&mut self, to: f64) {
        let now = self.clock.now();
        let target = if to.is_finite() { to.max(0.0) } else { 0.0 };
        if self.state.transport.is_running() {
            self.relocate(now, target);
        } else {
            self.state.transport.seek(now, target);
        }
        self.cycle.arm(self.state.transport.position().time);
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn rewind(&mut self, seconds: f64) {
        let position = self.current_time();
        self.seek(position - seconds.abs());
    }

    pub fn fast_forward(&mut self, seconds: f64) {
        let position = self.current_time();
        self.seek(position + seconds.abs());
    }

    pub fn skip_to_beginning(&mut self) {
        self.seek(0.0);
    }

    /// Seek to the end of the last region
    pub fn skip_to_end(&mut self) {
        let end = self.state.project.end_time();
        self.seek(end);
    }

    fn current_time(&self) -> f64 {
        self.state.transport.current_position(self.clock.now())
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// Flip cycling; returns whether it is now enabled
    pub fn toggle_cycle(&mut self) -> bool {
        let position = self.current_time();
        let enabled = self.cycle.toggle(position);
        info!(
            "[CYCLE] Cycling {}",
            if enabled { "enabled" } else { "disabled" }
        );
        enabled
    }

    pub fn set_cycle_region(&mut self, start: f64, end: f64) -> Result<()> {
        let region = CycleRegion::new(start, end, self.config.min_cycle_length)?;
        let position = self.current_time();
        self.cycle.set_region(region, position);
        info!("[CYCLE] Region set to {:.3}s - {:.3}s", start, end);
        Ok(())
    }

    pub fn cycle(&self) -> &CycleController {
        &self.cycle
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the position, poll a pending engine start and wrap the loop
    ///
    /// A no-op while frozen.
    pub fn tick(&mut self) -> PlaybackPosition {
        if self.frozen {
            return self.state.transport.position();
        }
        let now = self.clock.now();
        self.poll_startup(now);

        let position = self.state.transport.tick(now);
        let playing = self.state.transport.is_playing();
        match self.cycle.check(now, position.time, playing, self.frozen) {
            Some(target) => {
                self.transport_safe_jump(now, target);
                self.state.transport.position()
            }
            None => position,
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Reschedule all tracks from the transport position and start them together
    fn begin_playback(&mut self, now: f64) {
        let position = self.state.transport.tick(now).time;
        self.cycle.arm(position);
        self.reschedule_all(position);
        self.start_all_players(now);
    }

    /// Replace every track's queued segments with a schedule from `start_time`
    fn reschedule_all(&mut self, start_time: f64) {
        let scheduler = RegionScheduler::new(self.loader.as_ref());
        let state = &mut self.state;
        for track in &state.project.tracks {
            let Some(player) = state.topology.player_mut(track.id) else {
                warn!("[ENGINE] Track {} has no source node", track.id);
                continue;
            };
            player.stop();
            let report = scheduler.schedule_from_position(track, start_time, player);
            state.schedules.insert(track.id, report);
        }
    }

    fn reschedule_track(&mut self, id: TrackId, start_time: f64, start_at: f64) {
        let scheduler = RegionScheduler::new(self.loader.as_ref());
        let state = &mut self.state;
        let (Some(track), Some(player)) = (state.project.track(id), state.topology.player_mut(id))
        else {
            return;
        };
        player.stop();
        let report = scheduler.schedule_from_position(track, start_time, player);
        player.play(start_at);
        state.schedules.insert(id, report);
    }

    /// Give every source node the same start time
    fn start_all_players(&mut self, start_at: f64) {
        let ids: Vec<TrackId> = self.state.project.tracks.iter().map(|t| t.id).collect();
        for id in ids {
            if let Some(player) = self.state.topology.player_mut(id) {
                player.play(start_at);
            }
        }
    }

    // ========================================================================
    // Tracks & Buses
    // ========================================================================

    pub fn add_track(&mut self, track: Track) -> Result<TrackId> {
        let id = track.id;
        if self.state.project.track(id).is_some() {
            return Err(EngineError::DuplicateEntity { id: id.to_string() });
        }
        self.safe_mutation("add_track", |state| {
            state.topology.create_track_nodes(&track)?;
            state.project.tracks.push(track);
            state.sync_track(id)?;
            state.apply_solo()
        })?;
        info!("[ENGINE] Added track {}", id);
        Ok(id)
    }

    pub fn remove_track(&mut self, id: TrackId) -> Result<()> {
        if self.state.project.track(id).is_none() {
            return Err(EngineError::UnknownTrack { id });
        }
        self.safe_mutation("remove_track", |state| {
            state.topology.remove_track_nodes(id);
            state.project.tracks.retain(|t| t.id != id);
            state.schedules.remove(&id);
            state.apply_solo()
        })?;
        info!("[ENGINE] Removed track {}", id);
        Ok(())
    }

    /// Add a bus; sends that were waiting for it are connected
    pub fn add_bus(&mut self, bus: Bus) -> Result<BusId> {
        let id = bus.id;
        if self.state.project.bus(id).is_some() {
            return Err(EngineError::DuplicateEntity { id: id.to_string() });
        }
        self.safe_mutation("add_bus", |state| {
            state.topology.create_bus_nodes(&bus)?;
            state.project.buses.push(bus);
            state.sync_buses()
        })?;
        info!("[ENGINE] Added bus {}", id);
        Ok(id)
    }

    /// Remove a bus after tearing down every send that targets it
    pub fn remove_bus(&mut self, id: BusId) -> Result<()> {
        if self.state.project.bus(id).is_none() {
            return Err(EngineError::UnknownBus { id });
        }
        self.safe_mutation("remove_bus", |state| {
            state.topology.remove_bus_nodes(id);
            for track in &mut state.project.tracks {
                track.sends.retain(|s| s.bus != id);
            }
            state.project.buses.retain(|b| b.id != id);
            state.sync_buses()
        })?;
        info!("[ENGINE] Removed bus {}", id);
        Ok(())
    }

    // ========================================================================
    // Mixer
    // ========================================================================

    fn track_record_mut(&mut self, id: TrackId) -> Result<&mut Track> {
        self.state
            .project
            .track_mut(id)
            .ok_or(EngineError::UnknownTrack { id })
    }

    fn bus_record_mut(&mut self, id: BusId) -> Result<&mut Bus> {
        self.state
            .project
            .bus_mut(id)
            .ok_or(EngineError::UnknownBus { id })
    }

    pub fn update_track_volume(&mut self, id: TrackId, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.track_record_mut(id)?.mixer.volume = volume;
        self.state.topology.set_track_volume(id, volume)
    }

    pub fn update_track_pan(&mut self, id: TrackId, pan: f32) -> Result<()> {
        let pan = pan.clamp(-1.0, 1.0);
        self.track_record_mut(id)?.mixer.pan = pan;
        self.state.topology.set_track_pan(id, pan)
    }

    pub fn update_track_mute(&mut self, id: TrackId, mute: bool) -> Result<()> {
        self.track_record_mut(id)?.mixer.mute = mute;
        self.state.apply_solo()
    }

    /// Change a solo flag and re-resolve every track's effective mute
    pub fn update_track_solo(&mut self, id: TrackId, solo: bool) -> Result<()> {
        self.track_record_mut(id)?.mixer.solo = solo;
        self.state.apply_solo()
    }

    /// Set the three-band EQ, clamped to the configured gain bound
    pub fn update_track_eq(&mut self, id: TrackId, eq: EqSettings) -> Result<()> {
        let eq = clamp_eq(eq, self.config.max_eq_gain_db);
        self.track_record_mut(id)?.mixer.eq = eq;
        self.state.topology.set_track_eq(id, eq)
    }

    pub fn update_track_time_pitch(&mut self, id: TrackId, time_pitch: TimePitch) -> Result<()> {
        self.track_record_mut(id)?.time_pitch = time_pitch;
        self.state.topology.set_track_time_pitch(id, time_pitch)
    }

    pub fn update_track_record_enabled(&mut self, id: TrackId, enabled: bool) -> Result<()> {
        self.track_record_mut(id)?.mixer.record_enabled = enabled;
        Ok(())
    }

    pub fn update_master_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.project.master_volume = volume;
        self.state.topology.set_master_volume(volume);
    }

    pub fn update_bus_output_level(&mut self, id: BusId, level: f32) -> Result<()> {
        self.bus_record_mut(id)?.output_gain = level.max(0.0);
        self.state.sync_buses()
    }

    pub fn update_bus_input_gain(&mut self, id: BusId, level: f32) -> Result<()> {
        self.bus_record_mut(id)?.input_gain = level.max(0.0);
        self.state.sync_buses()
    }

    pub fn update_bus_mute(&mut self, id: BusId, mute: bool) -> Result<()> {
        self.bus_record_mut(id)?.mute = mute;
        self.state.sync_buses()
    }

    pub fn update_bus_solo(&mut self, id: BusId, solo: bool) -> Result<()> {
        self.bus_record_mut(id)?.solo = solo;
        self.state.sync_buses()
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Send a track's post-fader output to a bus
    ///
    /// A bus that does not exist yet leaves the send deferred until it is
    /// added.
    pub fn setup_track_send(&mut self, track: TrackId, bus: BusId, level: f32) -> Result<SendStatus> {
        self.wire_send(track, bus, level, false)
    }

    /// Send a track's signal to a bus ahead of its gain stage
    pub fn setup_pre_fader_send(
        &mut self,
        track: TrackId,
        bus: BusId,
        level: f32,
    ) -> Result<SendStatus> {
        self.wire_send(track, bus, level, true)
    }

    fn wire_send(
        &mut self,
        track: TrackId,
        bus: BusId,
        level: f32,
        pre_fader: bool,
    ) -> Result<SendStatus> {
        if self.state.project.track(track).is_none() {
            return Err(EngineError::UnknownTrack { id: track });
        }
        let level = level.clamp(0.0, 1.0);
        self.safe_mutation("setup_track_send", |state| {
            let status = state.topology.wire_send(track, bus, level, pre_fader)?;
            if let Some(record) = state.project.track_mut(track) {
                match record.sends.iter_mut().find(|s| s.bus == bus) {
                    Some(send) => {
                        send.level = level;
                        send.pre_fader = pre_fader;
                    }
                    None => record.sends.push(Send {
                        bus,
                        level,
                        pre_fader,
                    }),
                }
            }
            Ok(status)
        })
    }

    pub fn update_track_send_level(&mut self, track: TrackId, bus: BusId, level: f32) -> Result<()> {
        self.require_send(track, bus)?;
        let level = level.clamp(0.0, 1.0);
        self.safe_mutation("update_track_send_level", |state| {
            state.topology.update_send_level(track, bus, level)?;
            if let Some(send) = state
                .project
                .track_mut(track)
                .and_then(|t| t.sends.iter_mut().find(|s| s.bus == bus))
            {
                send.level = level;
            }
            Ok(())
        })
    }

    pub fn remove_track_send(&mut self, track: TrackId, bus: BusId) -> Result<()> {
        self.require_send(track, bus)?;
        self.safe_mutation("remove_track_send", |state| {
            state.topology.remove_send(track, bus)?;
            if let Some(record) = state.project.track_mut(track) {
                record.sends.retain(|s| s.bus != bus);
            }
            Ok(())
        })
    }

    fn require_send(&self, track: TrackId, bus: BusId) -> Result<()> {
        let record = self
            .state
            .project
            .track(track)
            .ok_or(EngineError::UnknownTrack { id: track })?;
        if record.send_to(bus).is_none() {
            return Err(EngineError::UnknownSend { track, bus });
        }
        Ok(())
    }

    // ========================================================================
    // Bus Effects
    // ========================================================================

    /// Insert an effect at `index` (appended when `None`) and rebuild the chain
    pub fn add_effect_to_bus(
        &mut self,
        bus: BusId,
        stage: EffectStage,
        index: Option<usize>,
    ) -> Result<EffectId> {
        let record = self
            .state
            .project
            .bus(bus)
            .ok_or(EngineError::UnknownBus { id: bus })?;
        if record.effect(stage.id).is_some() {
            return Err(EngineError::DuplicateEntity {
                id: stage.id.to_string(),
            });
        }
        let effect = stage.id;
        let kind = stage.kind;
        self.safe_mutation("add_effect_to_bus", |state| {
            let record = state
                .project
                .bus_mut(bus)
                .ok_or(EngineError::UnknownBus { id: bus })?;
            let index = index.unwrap_or(record.effects.len());
            record.insert_effect(index, stage);
            let record = state
                .project
                .bus(bus)
                .ok_or(EngineError::UnknownBus { id: bus })?;
            state.topology.rebuild_bus_effect_chain(record)
        })?;
        info!("[ENGINE] Added {} effect {} to bus {}", kind, effect, bus);
        Ok(effect)
    }

    pub fn remove_effect_from_bus(&mut self, bus: BusId, effect: EffectId) -> Result<EffectStage> {
        self.require_effect(bus, effect)?;
        self.safe_mutation("remove_effect_from_bus", |state| {
            let record = state
                .project
                .bus_mut(bus)
                .ok_or(EngineError::UnknownBus { id: bus })?;
            let removed = record
                .remove_effect(effect)
                .ok_or(EngineError::UnknownEffect { bus, effect })?;
            let record = state
                .project
                .bus(bus)
                .ok_or(EngineError::UnknownBus { id: bus })?;
            state.topology.rebuild_bus_effect_chain(record)?;
            Ok(removed)
        })
    }

    /// Replace an effect stage
    ///
    /// Toggling `enabled` or changing the kind rewires the chain under a safe
    /// mutation; a parameter-only change is applied in place.
    pub fn update_bus_effect(&mut self, bus: BusId, stage: EffectStage) -> Result<()> {
        let current = self.require_effect(bus, stage.id)?;
        let rewire = current.enabled != stage.enabled || current.kind != stage.kind;
        let effect = stage.id;

        if rewire {
            return self.safe_mutation("update_bus_effect", |state| {
                let record = state
                    .project
                    .bus_mut(bus)
                    .ok_or(EngineError::UnknownBus { id: bus })?;
                if let Some(slot) = record.effect_mut(effect) {
                    *slot = stage;
                }
                let record = state
                    .project
                    .bus(bus)
                    .ok_or(EngineError::UnknownBus { id: bus })?;
                state.topology.rebuild_bus_effect_chain(record)
            });
        }

        self.state.topology.apply_effect_parameters(bus, &stage)?;
        if let Some(slot) = self.bus_record_mut(bus)?.effect_mut(effect) {
            *slot = stage;
        }
        Ok(())
    }

    /// Move an effect to `index` within its bus and rebuild the chain
    pub fn move_bus_effect(&mut self, bus: BusId, effect: EffectId, index: usize) -> Result<()> {
        self.require_effect(bus, effect)?;
        self.safe_mutation("move_bus_effect", |state| {
            let record = state
                .project
                .bus_mut(bus)
                .ok_or(EngineError::UnknownBus { id: bus })?;
            record.move_effect(effect, index);
            let record = state
                .project
                .bus(bus)
                .ok_or(EngineError::UnknownBus { id: bus })?;
            state.topology.rebuild_bus_effect_chain(record)
        })
    }

    fn require_effect(&self, bus: BusId, effect: EffectId) -> Result<EffectStage> {
        self.state
            .project
            .bus(bus)
            .ok_or(EngineError::UnknownBus { id: bus })?
            .effect(effect)
            .cloned()
            .ok_or(EngineError::UnknownEffect { bus, effect })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Output level of each track's final stage
    pub fn get_track_levels(&self) -> HashMap<TrackId, f32> {
        self.state
            .project
            .tracks
            .iter()
            .filter_map(|track| {
                let nodes = self.state.topology.track_nodes(track.id)?;
                Some((track.id, self.render.output_level(nodes.pan)))
            })
            .collect()
    }

    pub fn get_master_level(&self) -> f32 {
        self.render.output_level(self.state.topology.master())
    }

    pub fn transport_state(&self) -> TransportState {
        self.state.transport.state()
    }

    /// Position as of the last tick or transport change
    pub fn playback_position(&self) -> PlaybackPosition {
        self.state.transport.position()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &NodeGraph {
        self.state.topology.graph()
    }

    pub fn track_nodes(&self, id: TrackId) -> Option<&TrackNodes> {
        self.state.topology.track_nodes(id)
    }

    pub fn bus_nodes(&self, id: BusId) -> Option<&BusNodes> {
        self.state.topology.bus_nodes(id)
    }

    /// Segments currently queued on a track's source node
    pub fn scheduled_segments(&self, id: TrackId) -> Option<&[ScheduledSegment]> {
        self.state.topology.player(id).map(|p| p.segments())
    }

    pub fn schedule_report(&self, id: TrackId) -> Option<&ScheduleReport> {
        self.state.schedule(id)
    }

    /// Stop transport and release the render engine
    pub fn shutdown(&mut self) {
        self.stop();
        self.render.stop();
        self.startup.reset();
        info!("[ENGINE] Shut down");
    }
}
