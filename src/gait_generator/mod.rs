use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nalgebra::{Point3, Vector2};
use tracing::*;

use crate::error::{ScuttleError, ScuttleResult};
use crate::gait::{Direction, Gait, GaitKind, GaitParams, GaitState, LegSet};
use crate::hexapod::{Hexapod, PredefinedPosition};

/// Granularity of the stop-event polling inside dwell sleeps.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Number of cycles needed to rotate by `angle_degrees`.
///
/// One cycle sweeps an arc of `step_radius` at the end effector radius, so
/// the per-cycle angle is `step_radius / end_effector_radius` radians.
/// Always at least one cycle.
fn cycles_for_rotation(angle_degrees: f32, step_radius: f32, end_effector_radius: f32) -> u32 {
    let rotation_per_cycle = (step_radius / end_effector_radius).to_degrees();
    let cycles = (angle_degrees.abs() / rotation_per_cycle).ceil();
    (cycles as u32).max(1)
}

#[derive(Debug, Clone, Copy, Default)]
struct RunMode {
    max_cycles: Option<u32>,
    max_duration: Option<Duration>,
    handle_direction_changes: bool,
}

/// Flags and counters shared between the caller and the gait thread.
struct SharedState {
    running: AtomicBool,
    stop_event: AtomicBool,
    stop_requested: AtomicBool,
    cycle_count: AtomicU32,
    total_phases_executed: AtomicU32,
    /// Direction change waiting for the next cycle boundary.
    pending_input: Mutex<Option<(Vector2<f32>, f32)>>,
    /// Last direction actually applied to the gait; used to skip no-op
    /// queue requests.
    applied_input: Mutex<(Vector2<f32>, f32)>,
}

impl SharedState {
    fn new() -> Self {
        SharedState {
            running: AtomicBool::new(false),
            stop_event: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            cycle_count: AtomicU32::new(0),
            total_phases_executed: AtomicU32::new(0),
            pending_input: Mutex::new(None),
            applied_input: Mutex::new((Vector2::new(0.0, 0.0), 0.0)),
        }
    }

    fn latch_stop_request(&self, context: &str) {
        if self.stop_event.load(Ordering::SeqCst) && !self.stop_requested.load(Ordering::SeqCst) {
            warn!("Stop event detected {context}, finishing current cycle");
            self.stop_requested.store(true, Ordering::SeqCst);
        }
    }
}

type RunOutcome = (Box<Hexapod>, Box<Gait>, ScuttleResult<()>);

enum GeneratorState {
    Idle {
        hexapod: Box<Hexapod>,
        gait: Option<Box<Gait>>,
    },
    Running {
        handle: JoinHandle<RunOutcome>,
    },
    /// Transient placeholder; only observable after a thread panic.
    Poisoned,
}

/// Owns the gait execution thread and the currently active gait.
///
/// While idle the generator holds the hexapod; starting any execution mode
/// moves hexapod and gait into the background thread, and joining moves
/// them back. Direct hexapod access is therefore only possible while no
/// gait is running.
pub struct GaitGenerator {
    state: GeneratorState,
    shared: Arc<SharedState>,
}

impl GaitGenerator {
    pub fn new(hexapod: Hexapod) -> Self {
        GaitGenerator {
            state: GeneratorState::Idle {
                hexapod: Box::new(hexapod),
                gait: None,
            },
            shared: Arc::new(SharedState::new()),
        }
    }

    /// Install the active gait. Fails while a gait is running.
    pub fn create_gait(&mut self, kind: GaitKind, params: GaitParams) -> ScuttleResult<()> {
        match &mut self.state {
            GeneratorState::Idle { gait, .. } => {
                info!(?kind, "creating gait");
                *gait = Some(Box::new(Gait::new(kind, params)));
                *self.shared.pending_input.lock().unwrap() = None;
                *self.shared.applied_input.lock().unwrap() = (Vector2::new(0.0, 0.0), 0.0);
                Ok(())
            }
            _ => Err(ScuttleError::GaitRunning),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, GeneratorState::Running { .. })
            && self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::SeqCst)
    }

    /// Completed cycles across all runs of this generator.
    pub fn cycle_count(&self) -> u32 {
        self.shared.cycle_count.load(Ordering::SeqCst)
    }

    /// Executed phases across all runs of this generator.
    pub fn total_phases_executed(&self) -> u32 {
        self.shared.total_phases_executed.load(Ordering::SeqCst)
    }

    pub fn hexapod(&self) -> ScuttleResult<&Hexapod> {
        match &self.state {
            GeneratorState::Idle { hexapod, .. } => Ok(hexapod),
            GeneratorState::Running { .. } => Err(ScuttleError::GaitRunning),
            GeneratorState::Poisoned => Err(ScuttleError::GaitThreadPanicked),
        }
    }

    pub fn hexapod_mut(&mut self) -> ScuttleResult<&mut Hexapod> {
        match &mut self.state {
            GeneratorState::Idle { hexapod, .. } => Ok(hexapod),
            GeneratorState::Running { .. } => Err(ScuttleError::GaitRunning),
            GeneratorState::Poisoned => Err(ScuttleError::GaitThreadPanicked),
        }
    }

    pub fn gait(&self) -> ScuttleResult<&Gait> {
        match &self.state {
            GeneratorState::Idle { gait: Some(gait), .. } => Ok(gait),
            GeneratorState::Idle { gait: None, .. } => Err(ScuttleError::NoActiveGait),
            GeneratorState::Running { .. } => Err(ScuttleError::GaitRunning),
            GeneratorState::Poisoned => Err(ScuttleError::GaitThreadPanicked),
        }
    }

    /// Recover the hexapod from an idle generator.
    pub fn into_hexapod(self) -> ScuttleResult<Hexapod> {
        match self.state {
            GeneratorState::Idle { hexapod, .. } => Ok(*hexapod),
            GeneratorState::Running { .. } => Err(ScuttleError::GaitRunning),
            GeneratorState::Poisoned => Err(ScuttleError::GaitThreadPanicked),
        }
    }

    /// Set the movement input on the idle gait, by name.
    pub fn set_direction(&mut self, direction: Direction, rotation: f32) -> ScuttleResult<()> {
        self.set_direction_vector(direction.as_vector(), rotation)
    }

    /// Set the movement input on the idle gait, as a raw vector.
    pub fn set_direction_vector(
        &mut self,
        direction: Vector2<f32>,
        rotation: f32,
    ) -> ScuttleResult<()> {
        match &mut self.state {
            GeneratorState::Idle { gait: Some(gait), .. } => {
                gait.set_direction(direction, rotation);
                *self.shared.applied_input.lock().unwrap() = (direction, rotation);
                Ok(())
            }
            GeneratorState::Idle { gait: None, .. } => Err(ScuttleError::NoActiveGait),
            GeneratorState::Running { .. } => Err(ScuttleError::GaitRunning),
            GeneratorState::Poisoned => Err(ScuttleError::GaitThreadPanicked),
        }
    }

    /// Queue a direction change to be applied at the next cycle boundary.
    ///
    /// The continuous run loop walks the legs back to neutral before
    /// applying the change, so the robot never changes direction
    /// mid-stride. Queuing the currently applied input is a no-op.
    pub fn queue_direction(&self, direction: Direction, rotation: f32) {
        self.queue_direction_vector(direction.as_vector(), rotation)
    }

    pub fn queue_direction_vector(&self, direction: Vector2<f32>, rotation: f32) {
        let applied = *self.shared.applied_input.lock().unwrap();
        if applied == (direction, rotation) {
            return;
        }
        debug!(?direction, rotation, "queued direction change");
        *self.shared.pending_input.lock().unwrap() = Some((direction, rotation));
    }

    /// Begin continuous execution. A no-op when already running.
    pub fn start(&mut self) -> ScuttleResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let mode = RunMode {
            handle_direction_changes: true,
            ..RunMode::default()
        };
        self.spawn(mode, "gait-continuous".to_owned())
    }

    /// Run exactly `cycles` full gait cycles, then stop.
    ///
    /// Zero cycles is a no-op. Use `wait` to join the run.
    pub fn execute_cycles(&mut self, cycles: u32) -> ScuttleResult<()> {
        if cycles == 0 {
            error!("Invalid number of cycles: 0");
            return Ok(());
        }
        let mode = RunMode {
            max_cycles: Some(cycles),
            ..RunMode::default()
        };
        self.spawn(mode, format!("gait-cycles-{cycles}"))
    }

    /// Run until the wall clock budget elapses, always finishing the
    /// current cycle.
    pub fn run_for_duration(&mut self, duration: Duration) -> ScuttleResult<()> {
        if duration.is_zero() {
            error!("Invalid duration: 0");
            return Ok(());
        }
        let mode = RunMode {
            max_duration: Some(duration),
            ..RunMode::default()
        };
        self.spawn(mode, format!("gait-duration-{}s", duration.as_secs_f32()))
    }

    /// Rotate in place by a target angle using the active gait.
    ///
    /// `rotation_direction` is the rotation input applied to the gait
    /// (positive clockwise), `step_radius` the arc length one cycle sweeps
    /// at the end effector radius.
    pub fn execute_rotation_by_angle(
        &mut self,
        angle_degrees: f32,
        rotation_direction: f32,
        step_radius: f32,
    ) -> ScuttleResult<()> {
        let end_effector_radius = self.hexapod()?.end_effector_radius();
        let cycles = cycles_for_rotation(angle_degrees, step_radius, end_effector_radius);
        info!(
            angle_degrees,
            step_radius, cycles, "executing rotation by angle"
        );
        self.set_direction(Direction::Neutral, rotation_direction)?;
        self.execute_cycles(cycles)
    }

    /// Join the gait thread without requesting a stop.
    pub fn wait(&mut self) -> ScuttleResult<()> {
        match mem::replace(&mut self.state, GeneratorState::Poisoned) {
            GeneratorState::Running { handle } => {
                let (hexapod, gait, result) = handle.join().map_err(|_| {
                    error!("gait thread panicked");
                    ScuttleError::GaitThreadPanicked
                })?;
                self.state = GeneratorState::Idle {
                    hexapod,
                    gait: Some(gait),
                };
                result
            }
            idle @ GeneratorState::Idle { .. } => {
                self.state = idle;
                Ok(())
            }
            GeneratorState::Poisoned => Err(ScuttleError::GaitThreadPanicked),
        }
    }

    /// Soft stop: the current cycle completes, the legs return to neutral
    /// and the thread is joined. A no-op when not running.
    pub fn stop(&mut self) -> ScuttleResult<()> {
        if matches!(self.state, GeneratorState::Running { .. }) {
            self.shared.stop_event.store(true, Ordering::SeqCst);
        }
        self.wait()
    }

    fn spawn(&mut self, mode: RunMode, thread_name: String) -> ScuttleResult<()> {
        let (hexapod, gait) = match mem::replace(&mut self.state, GeneratorState::Poisoned) {
            GeneratorState::Idle {
                hexapod,
                gait: Some(gait),
            } => (hexapod, gait),
            GeneratorState::Idle { hexapod, gait: None } => {
                self.state = GeneratorState::Idle { hexapod, gait: None };
                return Err(ScuttleError::NoActiveGait);
            }
            running @ GeneratorState::Running { .. } => {
                self.state = running;
                return Err(ScuttleError::GaitRunning);
            }
            GeneratorState::Poisoned => return Err(ScuttleError::GaitThreadPanicked),
        };

        self.shared.stop_event.store(false, Ordering::SeqCst);
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let run_loop = RunLoop {
            hexapod,
            gait,
            shared: Arc::clone(&self.shared),
            mode,
        };
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_loop.run())?;
        self.state = GeneratorState::Running { handle };
        Ok(())
    }
}

/// The gait thread body: owns hexapod and gait for the run's duration and
/// hands them back on exit.
struct RunLoop {
    hexapod: Box<Hexapod>,
    gait: Box<Gait>,
    shared: Arc<SharedState>,
    mode: RunMode,
}

impl RunLoop {
    fn run(mut self) -> RunOutcome {
        info!("Gait loop starting");
        let result = self.run_inner();
        if let Err(error) = &result {
            error!(
                %error,
                positions = ?self.hexapod.current_leg_positions(),
                "gait loop failed"
            );
            self.attempt_safe_return();
        }
        self.shared.running.store(false, Ordering::SeqCst);
        info!("Gait loop finished");
        (self.hexapod, self.gait, result)
    }

    fn run_inner(&mut self) -> ScuttleResult<()> {
        let start_time = Instant::now();
        let mut cycles_completed: u32 = 0;

        while self.shared.running.load(Ordering::SeqCst) {
            if let Some(max_cycles) = self.mode.max_cycles {
                if cycles_completed >= max_cycles {
                    info!("Reached maximum cycles ({max_cycles}), stopping");
                    break;
                }
            }
            if let Some(max_duration) = self.mode.max_duration {
                if start_time.elapsed() >= max_duration {
                    warn!("Time limit reached, finishing current cycle");
                    self.shared.stop_requested.store(true, Ordering::SeqCst);
                }
            }
            self.shared.latch_stop_request("before cycle");
            if self.shared.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            cycles_completed += 1;
            debug!("Executing cycle {cycles_completed}");
            self.execute_full_cycle()?;

            if self.shared.stop_requested.load(Ordering::SeqCst) {
                info!("Stop requested, completed current cycle");
                break;
            }

            if self.mode.handle_direction_changes {
                let pending = self.shared.pending_input.lock().unwrap().take();
                if let Some((direction, rotation)) = pending {
                    info!(
                        ?direction,
                        rotation, "applying queued direction after neutral return"
                    );
                    self.return_legs_to_neutral()?;
                    self.gait.set_direction(direction, rotation);
                    *self.shared.applied_input.lock().unwrap() = (direction, rotation);
                }
            }

            // pause between cycles
            if self.shared.running.load(Ordering::SeqCst)
                && !self.shared.stop_event.load(Ordering::SeqCst)
            {
                self.sleep_with_stop_poll(self.gait.params().dwell_time);
            }
        }

        self.return_legs_to_neutral()?;
        info!("Completed {cycles_completed} cycles");
        Ok(())
    }

    /// One traversal of the gait graph starting from the canonical phase.
    fn execute_full_cycle(&mut self) -> ScuttleResult<()> {
        let phases_per_cycle = self.gait.kind().phases_per_cycle();
        let mut state = self.gait.canonical_state();
        let mut phases_executed = 0u32;

        self.shared.latch_stop_request("before cycle start");

        loop {
            debug!(phase = ?state.phase, "executing phase");
            self.execute_phase(&state)?;
            phases_executed += 1;
            if phases_executed as usize >= phases_per_cycle {
                break;
            }

            self.sleep_with_stop_poll(state.dwell_time);
            self.shared.latch_stop_request("before state transition");
            state = self.gait.state(state.phase.successor());
        }

        self.shared.cycle_count.fetch_add(1, Ordering::SeqCst);
        self.shared
            .total_phases_executed
            .fetch_add(phases_executed, Ordering::SeqCst);
        Ok(())
    }

    /// Plan targets and paths for every active leg, then walk all of them
    /// through their waypoints together.
    fn execute_phase(&mut self, state: &GaitState) -> ScuttleResult<()> {
        debug!(
            swing = ?state.swing_legs,
            stance = ?state.stance_legs,
            "phase leg assignment"
        );
        for leg_index in state.swing_legs.indices() {
            self.plan_leg(leg_index, true);
        }
        for leg_index in state.stance_legs.indices() {
            self.plan_leg(leg_index, false);
        }
        self.execute_waypoints(state.swing_legs | state.stance_legs, state.dwell_time)
    }

    fn plan_leg(&mut self, leg_index: usize, is_swing: bool) {
        let current = self.hexapod.current_leg_positions()[leg_index];
        let mount_angle = self.hexapod.leg_mount_angles()[leg_index];
        let target = self.gait.calculate_leg_target(current, mount_angle, is_swing);
        self.gait
            .calculate_leg_path(current, leg_index, target, is_swing);
    }

    /// Step all active legs through their waypoints synchronously.
    ///
    /// Legs advance together at each index; a leg with a shorter path holds
    /// its final waypoint while longer paths continue. Every step is one
    /// atomic whole-body commit followed by the dwell sleep.
    fn execute_waypoints(&mut self, active_legs: LegSet, dwell_time: Duration) -> ScuttleResult<()> {
        let max_waypoints = active_legs
            .indices()
            .map(|leg_index| self.gait.leg_path(leg_index).waypoints().len())
            .max()
            .unwrap_or(0);

        for waypoint_index in 0..max_waypoints {
            let mut positions = *self.hexapod.current_leg_positions();
            for leg_index in active_legs.indices() {
                let waypoints = self.gait.leg_path(leg_index).waypoints();
                if waypoints.is_empty() {
                    continue;
                }
                positions[leg_index] = waypoints[waypoint_index.min(waypoints.len() - 1)];
            }
            self.hexapod.move_all_legs(&positions)?;
            self.sleep_with_stop_poll(dwell_time);
        }
        Ok(())
    }

    /// Move every leg's foot back over its own center at the stance height.
    ///
    /// Tripod gaits move two groups of three, wave (and any future gait)
    /// moves legs one at a time; both use swing-style lifted paths.
    fn return_legs_to_neutral(&mut self) -> ScuttleResult<()> {
        let stance_height = self.gait.params().stance_height;
        let dwell_time = self.gait.params().dwell_time;
        let target = Point3::new(0.0, 0.0, -stance_height);

        let groups: &[LegSet] = match self.gait.kind() {
            GaitKind::Tripod => &[LegSet::TRIPOD_A, LegSet::TRIPOD_B],
            GaitKind::Wave => &[
                LegSet::LEG_0,
                LegSet::LEG_1,
                LegSet::LEG_2,
                LegSet::LEG_3,
                LegSet::LEG_4,
                LegSet::LEG_5,
            ],
        };

        debug!("returning legs to neutral");
        for group in groups {
            for leg_index in group.indices() {
                let current = self.hexapod.current_leg_positions()[leg_index];
                self.gait.calculate_leg_path(current, leg_index, target, true);
            }
            self.execute_waypoints(*group, dwell_time)?;
        }
        Ok(())
    }

    /// Best effort park at the mechanically safe high profile pose after a
    /// mid-gait failure.
    fn attempt_safe_return(&mut self) {
        warn!("Attempting to return to safe position");
        if let Err(error) = self.hexapod.move_to_position(PredefinedPosition::HighProfile) {
            error!(%error, "safe return failed");
            return;
        }
        if let Err(error) = self
            .hexapod
            .wait_until_motion_complete(Some(&self.shared.stop_event))
        {
            error!(%error, "wait for safe return failed");
        }
    }

    /// Sleep for `duration` in short slices, latching the stop request when
    /// the stop event is raised. Zero duration returns immediately.
    fn sleep_with_stop_poll(&self, duration: Duration) {
        let start = Instant::now();
        loop {
            self.shared.latch_stop_request("during dwell");
            let elapsed = start.elapsed();
            if elapsed >= duration {
                break;
            }
            let remaining = duration - elapsed;
            thread::sleep(remaining.min(STOP_POLL_INTERVAL));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scuttle_config::ScuttleConfig;
    use crate::servo_controller::mock::MockServoController;
    use approx::assert_relative_eq;

    fn fast_params() -> GaitParams {
        GaitParams {
            step_radius: 30.0,
            leg_lift_distance: 20.0,
            stance_height: 0.0,
            dwell_time: Duration::ZERO,
            use_full_circle_stance: false,
        }
    }

    fn test_generator() -> GaitGenerator {
        let controller = MockServoController::new();
        let mut hexapod = Hexapod::new(ScuttleConfig::default(), Box::new(controller)).unwrap();
        hexapod.move_to_position(PredefinedPosition::Zero).unwrap();
        GaitGenerator::new(hexapod)
    }

    #[test]
    fn rotation_cycle_calculation_matches_geometry() {
        // arc of 30 mm at radius 200 mm is about 8.59° per cycle
        assert_eq!(cycles_for_rotation(90.0, 30.0, 200.0), 11);
        assert_eq!(cycles_for_rotation(-90.0, 30.0, 200.0), 11);
        // a target smaller than one cycle still runs a full cycle
        assert_eq!(cycles_for_rotation(1.0, 30.0, 200.0), 1);
    }

    #[test]
    fn tripod_forward_single_cycle_returns_feet_to_start() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Forward, 0.0).unwrap();

        generator.execute_cycles(1).unwrap();
        generator.wait().unwrap();

        assert_eq!(generator.cycle_count(), 1);
        assert_eq!(generator.total_phases_executed(), 2);
        for position in generator.hexapod().unwrap().current_leg_positions() {
            assert_relative_eq!(position.x, 0.0, epsilon = 0.1);
            assert_relative_eq!(position.y, 0.0, epsilon = 0.1);
            assert_relative_eq!(position.z, 0.0, epsilon = 0.1);
        }
    }

    #[test]
    fn wave_two_cycles_execute_twelve_phases() {
        let mut generator = test_generator();
        generator.create_gait(GaitKind::Wave, fast_params()).unwrap();
        generator.set_direction(Direction::Right, 0.0).unwrap();

        generator.execute_cycles(2).unwrap();
        generator.wait().unwrap();

        assert_eq!(generator.cycle_count(), 2);
        assert_eq!(generator.total_phases_executed(), 12);
        for position in generator.hexapod().unwrap().current_leg_positions() {
            assert_relative_eq!(position.x, 0.0, epsilon = 0.1);
            assert_relative_eq!(position.y, 0.0, epsilon = 0.1);
        }
    }

    #[test]
    fn cycle_counts_accumulate_across_runs() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Forward, 0.0).unwrap();

        generator.execute_cycles(2).unwrap();
        generator.wait().unwrap();
        generator.execute_cycles(3).unwrap();
        generator.wait().unwrap();

        assert_eq!(generator.cycle_count(), 5);
        assert_eq!(generator.total_phases_executed(), 10);
    }

    #[test]
    fn zero_cycles_is_a_no_op() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();

        generator.execute_cycles(0).unwrap();
        assert!(!generator.is_running());
        assert_eq!(generator.cycle_count(), 0);
    }

    #[test]
    fn execution_without_gait_fails() {
        let mut generator = test_generator();
        assert!(matches!(
            generator.execute_cycles(1),
            Err(ScuttleError::NoActiveGait)
        ));
        assert!(matches!(generator.start(), Err(ScuttleError::NoActiveGait)));
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut generator = test_generator();
        generator.stop().unwrap();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.stop().unwrap();
    }

    #[test]
    fn continuous_mode_stops_after_current_cycle() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Forward, 0.0).unwrap();

        generator.start().unwrap();
        // second start while running is a no-op
        generator.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        generator.stop().unwrap();

        assert!(!generator.is_running());
        assert!(generator.cycle_count() >= 1);
        // the neutral return leaves every foot over its own center
        for position in generator.hexapod().unwrap().current_leg_positions() {
            assert_relative_eq!(position.x, 0.0, epsilon = 0.1);
            assert_relative_eq!(position.y, 0.0, epsilon = 0.1);
        }
    }

    #[test]
    fn queued_direction_applies_between_cycles() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Forward, 0.0).unwrap();

        generator.start().unwrap();
        generator.queue_direction(Direction::Left, 0.0);
        thread::sleep(Duration::from_millis(50));
        generator.stop().unwrap();

        let gait = generator.gait().unwrap();
        assert_relative_eq!(gait.direction_input(), Direction::Left.as_vector());
        assert_eq!(gait.rotation_input(), 0.0);
    }

    #[test]
    fn queueing_the_applied_direction_is_ignored() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Forward, 0.0).unwrap();

        generator.queue_direction(Direction::Forward, 0.0);
        assert!(generator.shared.pending_input.lock().unwrap().is_none());

        generator.queue_direction(Direction::Backward, 0.5);
        assert!(generator.shared.pending_input.lock().unwrap().is_some());
    }

    #[test]
    fn direct_hexapod_access_blocked_while_running() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Forward, 0.0).unwrap();

        generator.start().unwrap();
        assert!(matches!(
            generator.hexapod_mut(),
            Err(ScuttleError::GaitRunning)
        ));
        assert!(matches!(
            generator.set_direction(Direction::Left, 0.0),
            Err(ScuttleError::GaitRunning)
        ));
        generator.stop().unwrap();
        assert!(generator.hexapod_mut().is_ok());
    }

    #[test]
    fn rotation_by_angle_runs_computed_cycles() {
        // side length 120 gives an end effector radius of exactly 200
        let mut config = ScuttleConfig::default();
        config.hexagon_side_length = 120.0;
        let controller = MockServoController::new();
        let mut hexapod = Hexapod::new(config, Box::new(controller)).unwrap();
        hexapod.move_to_position(PredefinedPosition::Zero).unwrap();
        let mut generator = GaitGenerator::new(hexapod);
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();

        generator
            .execute_rotation_by_angle(90.0, 1.0, 30.0)
            .unwrap();
        generator.wait().unwrap();

        assert_eq!(generator.cycle_count(), 11);
        let gait = generator.gait().unwrap();
        assert_relative_eq!(gait.direction_input(), Direction::Neutral.as_vector());
        assert_eq!(gait.rotation_input(), 1.0);
    }

    #[test]
    fn run_for_duration_finishes_last_cycle() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Forward, 0.0).unwrap();

        generator
            .run_for_duration(Duration::from_millis(20))
            .unwrap();
        thread::sleep(Duration::from_millis(60));
        generator.wait().unwrap();

        assert!(generator.cycle_count() >= 1);
        assert!(!generator.is_running());
    }

    #[test]
    fn marching_in_place_keeps_feet_at_center() {
        let mut generator = test_generator();
        generator
            .create_gait(GaitKind::Tripod, fast_params())
            .unwrap();
        generator.set_direction(Direction::Neutral, 0.0).unwrap();

        generator.execute_cycles(1).unwrap();
        generator.wait().unwrap();

        for position in generator.hexapod().unwrap().current_leg_positions() {
            assert_relative_eq!(*position, Point3::origin(), epsilon = 0.1);
        }
    }
}
