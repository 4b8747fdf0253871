use crate::config::PerformanceSettings;
use crate::core::events::Observers;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

const MIN_TARGET_FPS: f32 = 30.0;
const MAX_TARGET_FPS: f32 = 144.0;
const MAX_UNITS_CEILING: usize = 100;

/// Anything that hands out per-frame processing units.
pub trait BudgetSource {
    /// Grants at most `requested` units. Never blocks; may return 0.
    fn request_budget(&mut self, requested: usize) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceState {
    pub current_fps: f32,
    pub average_fps: f32,
    pub target_fps: f32,
    pub performance_score: f32,
    pub adaptive_budget: usize,
    pub used_this_frame: usize,
    pub underperforming: bool,
}

impl fmt::Display for PerformanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FPS: {:.1}/{:.0} | Score: {:.0}% | Budget: {}/{} | Underperforming: {}",
            self.average_fps,
            self.target_fps,
            self.performance_score * 100.0,
            self.used_this_frame,
            self.adaptive_budget,
            if self.underperforming { "YES" } else { "NO" }
        )
    }
}

/// Frame-rate monitor that converts a rolling performance score into a
/// per-frame unit budget.
///
/// The host calls [`tick`](Self::tick) once per rendered frame; every
/// consumer then asks for units through [`BudgetSource::request_budget`].
/// Within a frame `used_this_frame <= adaptive_budget` always holds.
#[derive(Debug)]
pub struct BudgetScheduler {
    settings: PerformanceSettings,
    max_units: usize,
    target_fps: f32,

    current_fps: f32,
    average_fps: f32,
    performance_score: f32,
    adaptive_budget: usize,
    used_this_frame: usize,
    underperforming: bool,

    history: Vec<f32>,
    history_index: usize,

    clock: f32,
    last_sample: f32,
    last_second: f32,
    units_this_second: usize,
    frames: u64,

    on_performance_changed: Observers<PerformanceState>,
}

impl BudgetScheduler {
    pub fn new(settings: PerformanceSettings) -> Self {
        let max_units = settings.max_units_per_frame.clamp(1, MAX_UNITS_CEILING);
        let target_fps = settings.target_fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS);
        let history_len = settings.history_len.max(1);

        info!(
            "Budget scheduler initialized - target FPS: {}, max units/frame: {}",
            target_fps, max_units
        );

        Self {
            settings,
            max_units,
            target_fps,
            current_fps: target_fps,
            average_fps: target_fps,
            performance_score: 1.0,
            adaptive_budget: max_units,
            used_this_frame: 0,
            underperforming: false,
            history: vec![target_fps; history_len],
            history_index: 0,
            clock: 0.0,
            last_sample: 0.0,
            last_second: 0.0,
            units_this_second: 0,
            frames: 0,
            on_performance_changed: Observers::new(),
        }
    }

    /// Starts a new frame that took `delta_time` seconds to render.
    pub fn tick(&mut self, delta_time: f32) {
        self.frames += 1;
        self.used_this_frame = 0;

        if delta_time > 0.0 {
            self.clock += delta_time;
            self.current_fps = 1.0 / delta_time;
        }

        self.history[self.history_index] = self.current_fps;
        self.history_index = (self.history_index + 1) % self.history.len();

        if self.clock - self.last_sample >= self.settings.sample_interval {
            self.update_average();
            self.update_score();
            self.last_sample = self.clock;
        }

        if self.clock - self.last_second >= 1.0 {
            self.units_this_second = 0;
            self.last_second = self.clock;
        }

        self.update_budget();
        self.check_threshold();
    }

    fn update_average(&mut self) {
        self.average_fps = self.history.iter().sum::<f32>() / self.history.len() as f32;
    }

    fn update_score(&mut self) {
        self.performance_score = if self.average_fps >= self.target_fps {
            1.0
        } else {
            let min_fps = self.target_fps * 0.5;
            ((self.average_fps - min_fps) / (self.target_fps - min_fps)).clamp(0.0, 1.0)
        };
    }

    fn update_budget(&mut self) {
        let scaled = |fraction: f32| ((self.max_units as f32 * fraction) as usize).max(1);
        self.adaptive_budget = if self.performance_score >= 0.9 {
            self.max_units
        } else if self.performance_score >= 0.7 {
            scaled(0.7)
        } else if self.performance_score >= 0.5 {
            scaled(0.4)
        } else {
            1
        };
        // A budget shrink mid-frame must not leave the frame over-spent.
        self.used_this_frame = self.used_this_frame.min(self.adaptive_budget);
    }

    fn check_threshold(&mut self) {
        let was = self.underperforming;
        self.underperforming = self.average_fps < self.target_fps * self.settings.underperform_ratio;

        if was != self.underperforming {
            if self.underperforming {
                warn!(
                    "Performance below threshold - FPS: {:.1}, target: {}",
                    self.average_fps, self.target_fps
                );
            } else {
                info!("Performance recovered - FPS: {:.1}", self.average_fps);
            }
            let state = self.state();
            self.on_performance_changed.notify(&state);
        }
    }

    pub fn can_calculate_this_frame(&self) -> bool {
        self.used_this_frame < self.adaptive_budget
    }

    pub fn remaining_this_frame(&self) -> usize {
        self.adaptive_budget - self.used_this_frame
    }

    pub fn state(&self) -> PerformanceState {
        PerformanceState {
            current_fps: self.current_fps,
            average_fps: self.average_fps,
            target_fps: self.target_fps,
            performance_score: self.performance_score,
            adaptive_budget: self.adaptive_budget,
            used_this_frame: self.used_this_frame,
            underperforming: self.underperforming,
        }
    }

    pub fn current_fps(&self) -> f32 {
        self.current_fps
    }

    pub fn average_fps(&self) -> f32 {
        self.average_fps
    }

    pub fn target_fps(&self) -> f32 {
        self.target_fps
    }

    pub fn performance_score(&self) -> f32 {
        self.performance_score
    }

    pub fn adaptive_budget(&self) -> usize {
        self.adaptive_budget
    }

    pub fn max_units_per_frame(&self) -> usize {
        self.max_units
    }

    pub fn used_this_frame(&self) -> usize {
        self.used_this_frame
    }

    pub fn units_this_second(&self) -> usize {
        self.units_this_second
    }

    pub fn is_underperforming(&self) -> bool {
        self.underperforming
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn on_performance_changed<F>(&mut self, listener: F)
    where
        F: FnMut(&PerformanceState) + 'static,
    {
        self.on_performance_changed.subscribe(listener);
    }

    /// Recomputes average, score, budget, and threshold immediately.
    pub fn recalculate(&mut self) {
        self.update_average();
        self.update_score();
        self.update_budget();
        self.check_threshold();
    }

    /// Refills the history with the target rate.
    pub fn reset_history(&mut self) {
        self.history.iter_mut().for_each(|s| *s = self.target_fps);
        self.current_fps = self.target_fps;
        self.average_fps = self.target_fps;
        self.performance_score = 1.0;
        self.last_sample = self.clock;
        self.update_budget();
        self.check_threshold();
        info!("Performance history reset");
    }

    pub fn set_target_fps(&mut self, target: f32) {
        self.target_fps = target.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS);
        info!("Target FPS changed to {}", self.target_fps);
    }

    pub fn set_max_units_per_frame(&mut self, max_units: usize) {
        self.max_units = max_units.clamp(1, MAX_UNITS_CEILING);
        self.update_budget();
        info!("Max units per frame changed to {}", self.max_units);
    }
}

impl BudgetSource for BudgetScheduler {
    fn request_budget(&mut self, requested: usize) -> usize {
        let granted = requested.min(self.remaining_this_frame());
        self.used_this_frame += granted;
        self.units_this_second += granted;
        granted
    }
}

impl fmt::Display for BudgetScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scheduler(max_units: usize, target_fps: f32) -> BudgetScheduler {
        BudgetScheduler::new(PerformanceSettings {
            max_units_per_frame: max_units,
            target_fps,
            ..PerformanceSettings::default()
        })
    }

    fn run(s: &mut BudgetScheduler, fps: f32, frames: usize) {
        for _ in 0..frames {
            s.tick(1.0 / fps);
        }
    }

    #[test]
    fn test_initial_state() {
        let s = scheduler(10, 72.0);
        assert_eq!(s.performance_score(), 1.0);
        assert_eq!(s.adaptive_budget(), 10);
        assert!(!s.is_underperforming());
        assert!(s.can_calculate_this_frame());
    }

    #[test]
    fn test_budget_conservation_within_frame() {
        let mut s = scheduler(10, 72.0);
        s.tick(1.0 / 72.0);

        let requests = [3, 4, 6, 2, 9];
        let mut total = 0;
        for &requested in &requests {
            let granted = s.request_budget(requested);
            assert!(granted <= requested);
            total += granted;
            assert!(total <= s.adaptive_budget());
        }
        assert_eq!(total, 10);
        assert_eq!(s.request_budget(1), 0);
        assert!(!s.can_calculate_this_frame());
        assert_eq!(s.used_this_frame(), total);
    }

    #[test]
    fn test_budget_resets_each_frame() {
        let mut s = scheduler(10, 72.0);
        s.tick(1.0 / 72.0);
        assert_eq!(s.request_budget(10), 10);
        s.tick(1.0 / 72.0);
        assert_eq!(s.used_this_frame(), 0);
        assert_eq!(s.request_budget(4), 4);
        assert_eq!(s.units_this_second(), 14);
    }

    #[test]
    fn test_degraded_frame_rate_shrinks_budget_but_never_to_zero() {
        let mut s = scheduler(10, 72.0);
        run(&mut s, 20.0, 120);
        assert!(s.performance_score() < 0.5);
        assert_eq!(s.adaptive_budget(), 1);
        assert_eq!(s.request_budget(5), 1);
    }

    #[test]
    fn test_intermediate_scores_use_step_budget() {
        // 66 FPS against 72: score = (66 - 36) / 36 ≈ 0.83 -> 70% budget.
        let mut s = scheduler(10, 72.0);
        run(&mut s, 66.0, 120);
        assert!((s.performance_score() - 0.8333).abs() < 0.01);
        assert_eq!(s.adaptive_budget(), 7);

        // 58 FPS: score ≈ 0.61 -> 40% budget.
        run(&mut s, 58.0, 120);
        assert_eq!(s.adaptive_budget(), 4);
    }

    #[test]
    fn test_recovery_to_target_restores_full_budget() {
        let mut s = scheduler(10, 72.0);
        run(&mut s, 30.0, 120);
        assert!(s.performance_score() < 0.1);

        run(&mut s, 72.0, 120);
        assert!((s.performance_score() - 1.0).abs() < 1e-4);
        assert!((s.average_fps() - 72.0).abs() < 0.1);
        assert_eq!(s.adaptive_budget(), s.max_units_per_frame());
    }

    #[test]
    fn test_underperformance_notifies_on_transitions_only() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut s = scheduler(10, 72.0);
        let sink = events.clone();
        s.on_performance_changed(move |state| sink.borrow_mut().push(state.underperforming));

        run(&mut s, 40.0, 200);
        assert!(s.is_underperforming());
        run(&mut s, 72.0, 200);
        assert!(!s.is_underperforming());

        assert_eq!(*events.borrow(), vec![true, false]);
    }

    #[test]
    fn test_runtime_tuning_is_clamped() {
        let mut s = scheduler(10, 72.0);
        s.set_target_fps(500.0);
        assert_eq!(s.target_fps(), 144.0);
        s.set_target_fps(5.0);
        assert_eq!(s.target_fps(), 30.0);
        s.set_max_units_per_frame(0);
        assert_eq!(s.max_units_per_frame(), 1);
        s.set_max_units_per_frame(250);
        assert_eq!(s.max_units_per_frame(), 100);
        assert_eq!(s.adaptive_budget(), 100);
    }

    #[test]
    fn test_configured_target_is_clamped_like_runtime_tuning() {
        let configured = scheduler(10, 200.0);
        let mut tuned = scheduler(10, 72.0);
        tuned.set_target_fps(200.0);
        assert_eq!(configured.target_fps(), 144.0);
        assert_eq!(configured.target_fps(), tuned.target_fps());
        assert_eq!(configured.state().average_fps, 144.0);

        assert_eq!(scheduler(10, 10.0).target_fps(), 30.0);
    }

    #[test]
    fn test_reset_history_restores_score() {
        let mut s = scheduler(10, 72.0);
        run(&mut s, 25.0, 120);
        s.reset_history();
        assert_eq!(s.performance_score(), 1.0);
        assert_eq!(s.adaptive_budget(), 10);
    }

    #[test]
    fn test_stats_line() {
        let mut s = scheduler(10, 72.0);
        s.tick(1.0 / 72.0);
        s.request_budget(3);
        let stats = s.to_string();
        assert!(stats.contains("FPS"));
        assert!(stats.contains("Budget: 3/10"));
        assert!(stats.contains("Score: 100%"));
        assert!(stats.contains("Underperforming: NO"));
    }

    #[test]
    fn test_zero_delta_keeps_previous_rate() {
        let mut s = scheduler(10, 72.0);
        s.tick(0.0);
        assert_eq!(s.current_fps(), 72.0);
    }
}
