//! The scripted point renderer.
//!
//! Each render pass runs the stages in a fixed order (setup once, frame,
//! beat when pending, then the point stage once per point) against one
//! shared set of script variables, and draws the resulting points or
//! connected strokes into the current frame buffer.
//!
//! Per-point state such as the previous pixel lives only for the duration of
//! one pass, so nothing leaks between frames except what scripts store in
//! their own variables.

use crate::context::{FrameBuffers, FrameSize, ProcessContext};
use crate::preset::{Overrides, ScriptSet};
use crate::raster::{copy_from, draw_thick_line, sample_color, to_pixel_coord, ColorRgba8, FrameBuffer};
use crate::rhai_engine::RhaiScriptEngine;
use crate::script_engine::ScriptEngine;
use crate::signal_bridge::LegacySignalBridge;
use crate::slots::{RegisteredSlots, Var};
use crate::stages::{ScriptStageManager, Stage, StageState};

/// Point count used when `n` is unset or not positive.
pub const DEFAULT_POINT_COUNT: usize = 512;
/// Hard upper bound on points per frame.
pub const MAX_POINT_COUNT: usize = 131_072;

const DEFAULT_INIT_POINTS: f64 = 100.0;
const MAX_THICKNESS: f64 = 255.0;

/// What one render pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Iterations of the point loop.
    pub points: usize,
    /// Points (or segments) actually drawn, i.e. not skipped.
    pub drawn: usize,
    pub beat_ran: bool,
}

/// Previous pixel of the current pass, for line-connect mode.
#[derive(Debug, Clone, Copy, Default)]
struct PointRenderState {
    last: Option<(i32, i32)>,
}

fn channel_to_byte(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5).floor() as u8
}

fn byte_to_channel(value: u8) -> f64 {
    value as f64 / 255.0
}

fn resolve_thickness(linesize: Option<f64>) -> i32 {
    let Some(value) = linesize else {
        return 1;
    };
    let rounded = (value + 0.5).floor();
    if rounded.is_nan() {
        1
    } else {
        rounded.clamp(1.0, MAX_THICKNESS) as i32
    }
}

/// Map the `n` variable to an iteration count.
fn resolve_point_count(n: Option<f64>) -> usize {
    // Float to int casts saturate and send NaN to 0.
    let requested = n.map_or(0, |v| v as i64);
    if requested <= 0 {
        DEFAULT_POINT_COUNT
    } else {
        (requested as u64).min(MAX_POINT_COUNT as u64) as usize
    }
}

fn normalized_index(index: usize, total: usize) -> f64 {
    if total > 1 {
        index as f64 / (total - 1) as f64
    } else {
        0.0
    }
}

/// Script-driven point renderer over a [`ScriptEngine`].
pub struct Superscope<E: ScriptEngine = RhaiScriptEngine> {
    engine: E,
    slots: RegisteredSlots,
    stages: ScriptStageManager<E>,
    bridge: LegacySignalBridge,
    overrides: Overrides,
    size: Option<FrameSize>,
    /// Coalesced: any number of beats before a render run the beat stage once.
    pending_beat: bool,
}

impl Default for Superscope<RhaiScriptEngine> {
    fn default() -> Self {
        Self::new(RhaiScriptEngine::new())
    }
}

impl<E: ScriptEngine> Superscope<E> {
    pub fn new(mut engine: E) -> Self {
        let slots = RegisteredSlots::register(&mut engine);
        Self {
            engine,
            slots,
            stages: ScriptStageManager::new(),
            bridge: LegacySignalBridge::new(),
            overrides: Overrides::default(),
            size: None,
            pending_beat: false,
        }
    }

    /// Reset the script-visible defaults for a frame size and schedule the
    /// setup stage to run again.
    pub fn init(&mut self, size: FrameSize) {
        self.slots = RegisteredSlots::register(&mut self.engine);
        self.size = Some(size);

        let defaults = [
            (Var::W, size.width as f64),
            (Var::H, size.height as f64),
            (Var::N, DEFAULT_INIT_POINTS),
            (Var::Skip, 0.0),
            (Var::LineSize, 1.0),
            (Var::DrawMode, 0.0),
            (Var::B, 0.0),
            (Var::Red, 0.0),
            (Var::Green, 0.0),
            (Var::Blue, 0.0),
        ];
        for (var, value) in defaults {
            self.slots.set(&mut self.engine, var, value);
        }

        self.stages.request_setup();
        log::debug!("Superscope initialised at {}x{}", size.width, size.height);
    }

    /// Replace all four scripts. Compilation happens on the next render.
    pub fn set_scripts(&mut self, scripts: ScriptSet) {
        self.stages.set_scripts(scripts);
        self.pending_beat = false;
    }

    pub fn set_overrides(&mut self, overrides: Overrides) {
        self.overrides = overrides;
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn scripts(&self) -> &ScriptSet {
        self.stages.scripts()
    }

    pub fn state(&self) -> StageState {
        self.stages.state()
    }

    pub fn stages(&self) -> &ScriptStageManager<E> {
        &self.stages
    }

    pub fn pending_beat(&self) -> bool {
        self.pending_beat
    }

    pub fn size(&self) -> Option<FrameSize> {
        self.size
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn slots(&self) -> &RegisteredSlots {
        &self.slots
    }

    pub fn bridge(&self) -> &LegacySignalBridge {
        &self.bridge
    }

    /// Current value of a canonical variable.
    pub fn var(&self, var: Var) -> Option<f64> {
        self.slots.get(&self.engine, var)
    }

    /// Publish one frame of timing and audio to the scripts.
    pub fn update(&mut self, ctx: &ProcessContext<'_>) {
        let audio = ctx.audio;
        self.bridge.refresh(ctx);

        let beat = if audio.beat { 1.0 } else { 0.0 };
        let values = [
            (Var::Time, ctx.time.t_seconds),
            (Var::Frame, ctx.time.frame_index as f64),
            (Var::Bass, audio.bass as f64),
            (Var::Mid, audio.mid as f64),
            (Var::Treb, audio.treb as f64),
            (Var::Rms, self.bridge.rms() as f64),
            (Var::Beat, beat),
            (Var::B, beat),
        ];
        for (var, value) in values {
            self.slots.set(&mut self.engine, var, value);
        }

        if audio.beat {
            self.pending_beat = true;
        }
        self.engine.set_legacy_sources(&self.bridge.sources());
    }

    fn apply_overrides(&mut self) {
        let Overrides {
            points,
            thickness,
            line_mode,
        } = self.overrides;
        if let Some(points) = points {
            self.slots.set(&mut self.engine, Var::N, points as f64);
        }
        if let Some(thickness) = thickness {
            self.slots.set(&mut self.engine, Var::LineSize, thickness as f64);
        }
        if let Some(line_mode) = line_mode {
            let mode = if line_mode { 1.0 } else { 0.0 };
            self.slots.set(&mut self.engine, Var::DrawMode, mode);
        }
    }

    /// Run the stages and draw this frame's points into `frame.current`.
    pub fn render(&mut self, frame: FrameBuffers<'_>) -> FrameStats {
        let FrameBuffers { current, previous } = frame;
        let mut stats = FrameStats::default();

        self.engine.begin_frame();
        self.stages.ensure_compiled(&mut self.engine);

        if let Some(previous) = previous {
            copy_from(current, previous);
        }

        self.stages.run_setup_once(&mut self.engine);
        self.stages.run(&mut self.engine, Stage::Frame);
        if self.pending_beat {
            stats.beat_ran = self.stages.run(&mut self.engine, Stage::Beat);
            self.pending_beat = false;
        }

        self.apply_overrides();

        let (width, height) = (current.width(), current.height());
        self.slots.set(&mut self.engine, Var::W, width as f64);
        self.slots.set(&mut self.engine, Var::H, height as f64);

        // Read once; the point stage cannot change this frame's count.
        let total = resolve_point_count(self.var(Var::N));
        self.slots.set(&mut self.engine, Var::N, total as f64);

        stats.points = total;
        stats.drawn = self.draw_points(current, previous, total);
        stats
    }

    fn draw_points(
        &mut self,
        current: &mut FrameBuffer,
        previous: Option<&FrameBuffer>,
        total: usize,
    ) -> usize {
        let (width, height) = (current.width(), current.height());
        let has_point_stage = self.stages.has(Stage::Point);
        let mut state = PointRenderState::default();
        let mut drawn = 0;

        for index in 0..total {
            let t = normalized_index(index, total);
            let (default_x, default_y) = (2.0 * t - 1.0, 0.0);
            let base = sample_color(previous.unwrap_or(&*current), default_x, default_y);

            let inputs = [
                (Var::I, t),
                (Var::V, self.bridge.sample_waveform(t)),
                (Var::Skip, 0.0),
                (Var::X, default_x),
                (Var::Y, default_y),
                (Var::Red, byte_to_channel(base.r)),
                (Var::Green, byte_to_channel(base.g)),
                (Var::Blue, byte_to_channel(base.b)),
            ];
            for (var, value) in inputs {
                self.slots.set(&mut self.engine, var, value);
            }

            if has_point_stage {
                self.stages.run(&mut self.engine, Stage::Point);
            }

            let x = self.var(Var::X).unwrap_or(default_x);
            let y = self.var(Var::Y).unwrap_or(default_y);
            let px = to_pixel_coord(x, width);
            let py = to_pixel_coord(y, height);

            let fallback = sample_color(previous.unwrap_or(&*current), x, y);
            let red = self.var(Var::Red).unwrap_or(byte_to_channel(fallback.r));
            let green = self.var(Var::Green).unwrap_or(byte_to_channel(fallback.g));
            let blue = self.var(Var::Blue).unwrap_or(byte_to_channel(fallback.b));
            let color = ColorRgba8::opaque(
                channel_to_byte(red),
                channel_to_byte(green),
                channel_to_byte(blue),
            );

            let thickness = resolve_thickness(self.var(Var::LineSize));
            let line_mode = self.var(Var::DrawMode).is_some_and(|mode| mode > 0.5);
            let skip = self.var(Var::Skip).unwrap_or(0.0);

            if skip <= 0.0 {
                let (from_x, from_y) = match state.last {
                    Some(last) if line_mode => last,
                    _ => (px, py),
                };
                draw_thick_line(current, from_x, from_y, px, py, thickness, color);
                drawn += 1;
            }
            state.last = Some((px, py));
        }

        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AudioFeatures, TimingInfo};

    fn lit(fb: &FrameBuffer) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        for y in 0..fb.height() as i32 {
            for x in 0..fb.width() as i32 {
                if fb.pixel(x, y).is_some_and(|p| p.a != 0) {
                    out.push((x, y));
                }
            }
        }
        out
    }

    fn scope_with(scripts: ScriptSet) -> Superscope {
        let mut scope: Superscope = Superscope::default();
        scope.init(FrameSize::new(64, 48));
        scope.set_scripts(scripts);
        scope
    }

    fn render_once(scope: &mut Superscope, fb: &mut FrameBuffer) -> FrameStats {
        scope.render(FrameBuffers::new(fb, None))
    }

    fn step(scope: &mut Superscope, audio: &AudioFeatures, frame: u64) {
        scope.update(&ProcessContext::new(TimingInfo::at_frame(frame, 60.0), audio));
    }

    #[test]
    fn test_resolve_point_count() {
        assert_eq!(resolve_point_count(None), DEFAULT_POINT_COUNT);
        assert_eq!(resolve_point_count(Some(0.0)), DEFAULT_POINT_COUNT);
        assert_eq!(resolve_point_count(Some(-4.0)), DEFAULT_POINT_COUNT);
        assert_eq!(resolve_point_count(Some(f64::NAN)), DEFAULT_POINT_COUNT);
        assert_eq!(resolve_point_count(Some(0.9)), DEFAULT_POINT_COUNT);
        assert_eq!(resolve_point_count(Some(1.0)), 1);
        assert_eq!(resolve_point_count(Some(99.7)), 99);
        assert_eq!(resolve_point_count(Some(1e12)), MAX_POINT_COUNT);
        assert_eq!(resolve_point_count(Some(f64::INFINITY)), MAX_POINT_COUNT);
    }

    #[test]
    fn test_resolve_thickness() {
        assert_eq!(resolve_thickness(None), 1);
        assert_eq!(resolve_thickness(Some(0.0)), 1);
        assert_eq!(resolve_thickness(Some(-10.0)), 1);
        assert_eq!(resolve_thickness(Some(2.5)), 3);
        assert_eq!(resolve_thickness(Some(1000.0)), 255);
        assert_eq!(resolve_thickness(Some(f64::NAN)), 1);
    }

    #[test]
    fn test_channel_to_byte() {
        assert_eq!(channel_to_byte(-1.0), 0);
        assert_eq!(channel_to_byte(0.5), 128);
        assert_eq!(channel_to_byte(1.0), 255);
        assert_eq!(channel_to_byte(7.0), 255);
        assert_eq!(channel_to_byte(f64::NAN), 0);
    }

    #[test]
    fn test_init_writes_defaults() {
        let mut scope: Superscope = Superscope::default();
        scope.init(FrameSize::new(320, 200));
        assert_eq!(scope.var(Var::W), Some(320.0));
        assert_eq!(scope.var(Var::H), Some(200.0));
        assert_eq!(scope.var(Var::N), Some(100.0));
        assert_eq!(scope.var(Var::LineSize), Some(1.0));
        assert_eq!(scope.var(Var::DrawMode), Some(0.0));
    }

    #[test]
    fn test_default_line_runs_through_the_middle() {
        let mut scope = scope_with(ScriptSet::default());
        let mut fb = FrameBuffer::new(64, 48);
        let stats = render_once(&mut scope, &mut fb);
        assert_eq!(stats.points, 100);
        let row = to_pixel_coord(0.0, 48);
        let pixels = lit(&fb);
        assert_eq!(pixels.len(), 64);
        assert!(pixels.iter().all(|&(_, y)| y == row));
        assert_eq!(pixels.first(), Some(&(0, row)));
        assert_eq!(pixels.last(), Some(&(63, row)));
    }

    #[test]
    fn test_update_publishes_audio() {
        let mut scope = scope_with(ScriptSet::default());
        let audio = AudioFeatures {
            osc_l: vec![0.5; 32],
            beat: true,
            bass: 0.25,
            ..Default::default()
        };
        step(&mut scope, &audio, 30);
        assert_eq!(scope.var(Var::Frame), Some(30.0));
        assert_eq!(scope.var(Var::Time), Some(0.5));
        assert_eq!(scope.var(Var::Bass), Some(0.25));
        assert_eq!(scope.var(Var::Beat), Some(1.0));
        assert_eq!(scope.var(Var::B), Some(1.0));
        assert!((scope.var(Var::Rms).unwrap_or(0.0) - 0.5).abs() < 1e-6);
        assert!(scope.pending_beat());
    }

    #[test]
    fn test_point_count_is_clamped_and_written_back() {
        let mut scope = scope_with(ScriptSet::new("", "n = 1000000;", "", ""));
        let mut fb = FrameBuffer::new(8, 8);
        let stats = render_once(&mut scope, &mut fb);
        assert_eq!(stats.points, MAX_POINT_COUNT);
        assert_eq!(scope.var(Var::N), Some(MAX_POINT_COUNT as f64));

        scope.set_scripts(ScriptSet::new("", "n = -3;", "", ""));
        let stats = render_once(&mut scope, &mut fb);
        assert_eq!(stats.points, DEFAULT_POINT_COUNT);
        assert_eq!(scope.var(Var::N), Some(DEFAULT_POINT_COUNT as f64));
    }

    #[test]
    fn test_point_loop_sees_normalised_index() {
        let mut scope = scope_with(ScriptSet::new(
            "let first = -1.0; let last = -1.0; let count = 0.0;",
            "count = 0.0;",
            "",
            "if first < 0.0 { first = i; } last = i; count += 1.0;",
        ));
        let mut fb = FrameBuffer::new(16, 16);
        for points in [1, 2, 512] {
            scope.set_overrides(Overrides {
                points: Some(points),
                ..Default::default()
            });
            scope.set_scripts(scope.scripts().clone());
            render_once(&mut scope, &mut fb);
            let engine = scope.engine();
            assert_eq!(engine.variable("count"), Some(points as f64));
            assert_eq!(engine.variable("first"), Some(0.0));
            let expected_last = if points > 1 { 1.0 } else { 0.0 };
            assert_eq!(engine.variable("last"), Some(expected_last));
        }
    }

    #[test]
    fn test_point_stage_may_not_change_iteration_count() {
        let mut scope = scope_with(ScriptSet::new(
            "let count = 0.0;",
            "count = 0.0; n = 10;",
            "",
            "count += 1.0; n = 3;",
        ));
        let mut fb = FrameBuffer::new(16, 16);
        let stats = render_once(&mut scope, &mut fb);
        assert_eq!(stats.points, 10);
        assert_eq!(scope.engine().variable("count"), Some(10.0));
    }

    #[test]
    fn test_skip_everything_draws_nothing() {
        let mut scope = scope_with(ScriptSet::point_only("skip = 1;"));
        let mut fb = FrameBuffer::new(32, 32);
        let stats = render_once(&mut scope, &mut fb);
        assert_eq!(stats.drawn, 0);
        assert!(lit(&fb).is_empty());
    }

    #[test]
    fn test_no_line_carries_over_between_frames() {
        let mut scope = scope_with(ScriptSet::new(
            "let pass_no = 0;",
            "pass_no += 1;",
            "",
            "if pass_no == 1 { skip = 1; x = -1.0; y = -1.0; } else { x = 1.0; y = 1.0; }",
        ));
        scope.set_overrides(Overrides {
            points: Some(1),
            line_mode: Some(true),
            ..Default::default()
        });
        let mut first = FrameBuffer::new(16, 16);
        render_once(&mut scope, &mut first);
        assert!(lit(&first).is_empty());

        let mut second = FrameBuffer::new(16, 16);
        render_once(&mut scope, &mut second);
        assert_eq!(lit(&second), vec![(15, 15)]);
    }

    #[test]
    fn test_draw_mode_changes_connectivity_not_colour() {
        let script = "x = if i < 0.5 { -0.8 } else { 0.8 }; y = x; red = 1.0; green = 0.5; blue = 0.0;";
        let mut footprints = Vec::new();
        for line_mode in [false, true] {
            let mut scope = scope_with(ScriptSet::point_only(script));
            scope.set_overrides(Overrides {
                points: Some(2),
                line_mode: Some(line_mode),
                ..Default::default()
            });
            let mut fb = FrameBuffer::new(32, 32);
            render_once(&mut scope, &mut fb);
            let pixels = lit(&fb);
            let colours: Vec<_> = pixels.iter().filter_map(|&(x, y)| fb.pixel(x, y)).collect();
            assert!(colours.iter().all(|&c| c == ColorRgba8::opaque(255, 128, 0)));
            footprints.push(pixels.len());
        }
        assert_eq!(footprints[0], 2);
        assert!(footprints[1] > 2);
    }

    #[test]
    fn test_thickness_zero_matches_one() {
        let mut footprints = Vec::new();
        for thickness in [0.0, 1.0] {
            let mut scope = scope_with(ScriptSet::default());
            scope.set_overrides(Overrides {
                points: Some(10),
                thickness: Some(thickness),
                line_mode: Some(true),
            });
            let mut fb = FrameBuffer::new(32, 32);
            render_once(&mut scope, &mut fb);
            footprints.push(lit(&fb));
        }
        assert_eq!(footprints[0], footprints[1]);
    }

    #[test]
    fn test_beat_stage_runs_once_per_beat_frame() {
        let mut scope = scope_with(ScriptSet::new("let hits = 0;", "", "hits += 1;", "skip = 1;"));
        let mut fb = FrameBuffer::new(8, 8);
        let beat = AudioFeatures {
            beat: true,
            ..Default::default()
        };
        for frame in 0..3 {
            step(&mut scope, &beat, frame);
            assert!(render_once(&mut scope, &mut fb).beat_ran);
        }
        // A quiet frame does not re-fire.
        step(&mut scope, &AudioFeatures::default(), 3);
        assert!(!render_once(&mut scope, &mut fb).beat_ran);
        assert_eq!(scope.engine().variable("hits"), Some(3.0));
    }

    #[test]
    fn test_beats_coalesce_between_renders() {
        let mut scope = scope_with(ScriptSet::new("let hits = 0;", "", "hits += 1;", "skip = 1;"));
        let mut fb = FrameBuffer::new(8, 8);
        let beat = AudioFeatures {
            beat: true,
            ..Default::default()
        };
        for frame in 0..4 {
            step(&mut scope, &beat, frame);
        }
        render_once(&mut scope, &mut fb);
        assert_eq!(scope.engine().variable("hits"), Some(1.0));
    }

    #[test]
    fn test_set_scripts_clears_pending_beat() {
        let mut scope = scope_with(ScriptSet::default());
        let beat = AudioFeatures {
            beat: true,
            ..Default::default()
        };
        step(&mut scope, &beat, 0);
        assert!(scope.pending_beat());
        scope.set_scripts(ScriptSet::default());
        assert!(!scope.pending_beat());
    }

    #[test]
    fn test_width_and_height_follow_the_buffer() {
        let mut scope = scope_with(ScriptSet::default());
        let mut fb = FrameBuffer::new(20, 10);
        render_once(&mut scope, &mut fb);
        assert_eq!(scope.var(Var::W), Some(20.0));
        assert_eq!(scope.var(Var::H), Some(10.0));
    }

    #[test]
    fn test_previous_frame_is_copied_and_sampled() {
        let mut previous = FrameBuffer::new(16, 16);
        crate::raster::clear(&mut previous, ColorRgba8::opaque(0, 255, 0));
        let mut scope = scope_with(ScriptSet::point_only("y = -1.0;"));
        let mut current = FrameBuffer::new(16, 16);
        scope.render(FrameBuffers::new(&mut current, Some(&previous)));
        // Colours default to what the previous frame had under the point.
        assert_eq!(current.pixel(5, 0), Some(ColorRgba8::opaque(0, 255, 0)));
        assert_eq!(current.pixel(5, 8), Some(ColorRgba8::opaque(0, 255, 0)));
    }

    #[test]
    fn test_compile_failure_leaves_other_stages_running() {
        let mut scope = scope_with(ScriptSet::new(
            "let hits = 0;",
            "this will not ( compile",
            "",
            "hits += 1; skip = 1;",
        ));
        scope.set_overrides(Overrides {
            points: Some(4),
            ..Default::default()
        });
        let mut fb = FrameBuffer::new(8, 8);
        render_once(&mut scope, &mut fb);
        assert!(!scope.stages().has(Stage::Frame));
        assert_eq!(scope.engine().variable("hits"), Some(4.0));
    }

    #[test]
    fn test_setup_runs_once_until_edit() {
        let mut scope = scope_with(ScriptSet::new("runs_total += 1.0;", "", "", ""));
        scope.engine_mut().register_slot("runs_total");
        let mut fb = FrameBuffer::new(8, 8);
        render_once(&mut scope, &mut fb);
        render_once(&mut scope, &mut fb);
        assert_eq!(scope.engine().variable("runs_total"), Some(1.0));
        assert_eq!(scope.state(), StageState::Ready);

        scope.set_scripts(scope.scripts().clone());
        render_once(&mut scope, &mut fb);
        assert_eq!(scope.engine().variable("runs_total"), Some(2.0));
        assert_eq!(scope.stages().compile_count(), 2);
    }
}
