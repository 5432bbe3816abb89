//! Pointer gestures on the timeline mapped onto selection updates.
//!
//! The controller is a plain state machine fed with [`PointerEvent`] values;
//! it owns only the drag mode and mutates the [`SelectionModel`] it is handed.

use crate::selection::{MIN_SPAN_SECONDS, SelectionEdge, SelectionModel};

/// Handle hit radius for a mouse pointer, in pixels.
pub const MOUSE_THRESHOLD_PX: f64 = 12.0;
/// Handle hit radius for touch input, in pixels.
pub const TOUCH_THRESHOLD_PX: f64 = 15.0;
/// Handle hit radius for touch on coarse (mobile) screens, in pixels.
pub const COARSE_TOUCH_THRESHOLD_PX: f64 = 20.0;

/// Kind of device that produced a pointer event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
    /// Touch on a device reporting a coarse primary pointer.
    CoarseTouch,
}

/// Input events fed to the controller; `x` is relative to the timeline's left edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down { x: f64, kind: PointerKind },
    Move { x: f64 },
    Up,
    /// Pointer left the timeline; ends a drag like `Up`.
    Leave,
}

/// Active gesture.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DragMode {
    #[default]
    None,
    DraggingStart,
    DraggingEnd,
    /// Creating a new range from the time where the press landed.
    DraggingNew { anchor: f64 },
}

/// Cursor affordance suggested for the current pointer position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorHint {
    /// Over a selection handle.
    Resize,
    /// Inside the selection.
    Move,
    /// Outside the selection.
    Crosshair,
    /// A drag is in progress.
    Dragging,
}

/// Handle hit radii, overridable from configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitThresholds {
    pub mouse_px: f64,
    pub touch_px: f64,
    pub coarse_touch_px: f64,
}

impl Default for HitThresholds {
    fn default() -> Self {
        Self {
            mouse_px: MOUSE_THRESHOLD_PX,
            touch_px: TOUCH_THRESHOLD_PX,
            coarse_touch_px: COARSE_TOUCH_THRESHOLD_PX,
        }
    }
}

impl HitThresholds {
    fn for_kind(&self, kind: PointerKind) -> f64 {
        match kind {
            PointerKind::Mouse => self.mouse_px,
            PointerKind::Touch => self.touch_px,
            PointerKind::CoarseTouch => self.coarse_touch_px,
        }
    }
}

/// Pixel width of the rendered timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineGeometry {
    pub width_px: f64,
}

impl TimelineGeometry {
    pub fn new(width_px: f64) -> Self {
        Self { width_px }
    }

    /// Pixel position of `time` over a timeline spanning `duration`.
    pub fn time_to_px(&self, time: f64, duration: f64) -> f64 {
        if duration <= 0.0 {
            return 0.0;
        }
        time / duration * self.width_px
    }

    /// Time under pixel `x`, clamped to `[0, duration]`.
    pub fn px_to_time(&self, x: f64, duration: f64) -> f64 {
        if self.width_px <= 0.0 || !x.is_finite() {
            return 0.0;
        }
        (x / self.width_px * duration).clamp(0.0, duration.max(0.0))
    }
}

/// What an event did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InteractionOutcome {
    /// Cursor affordance after the event.
    pub cursor: CursorHint,
    /// Handle under the pointer or being dragged, for highlighting.
    pub active_edge: Option<SelectionEdge>,
    /// True when the selection changed.
    pub selection_changed: bool,
}

/// Drag-mode state machine for the timeline.
#[derive(Clone, Debug, Default)]
pub struct InteractionController {
    mode: DragMode,
    last_kind: Option<PointerKind>,
    thresholds: HitThresholds,
}

impl InteractionController {
    pub fn new(thresholds: HitThresholds) -> Self {
        Self {
            mode: DragMode::None,
            last_kind: None,
            thresholds,
        }
    }

    /// Current gesture.
    pub fn mode(&self) -> DragMode {
        self.mode
    }

    /// True while a drag is active.
    pub fn is_dragging(&self) -> bool {
        self.mode != DragMode::None
    }

    /// Abandon any gesture without touching the selection.
    pub fn cancel(&mut self) {
        self.mode = DragMode::None;
    }

    /// Feed one event; the selection is updated in place.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        selection: &mut SelectionModel,
        geometry: TimelineGeometry,
    ) -> InteractionOutcome {
        match event {
            PointerEvent::Down { x, kind } => self.pointer_down(x, kind, selection, geometry),
            PointerEvent::Move { x } => match self.mode {
                DragMode::None => self.hover(x, selection, geometry),
                _ => self.drag_to(x, selection, geometry),
            },
            PointerEvent::Up | PointerEvent::Leave => self.release(selection),
        }
    }

    fn pointer_down(
        &mut self,
        x: f64,
        kind: PointerKind,
        selection: &mut SelectionModel,
        geometry: TimelineGeometry,
    ) -> InteractionOutcome {
        self.last_kind = Some(kind);
        if selection.duration() <= 0.0 {
            return idle(CursorHint::Crosshair, None);
        }
        let threshold = self.thresholds.for_kind(kind);
        match hit_edge(x, selection, geometry, threshold) {
            Some(SelectionEdge::Start) => {
                self.mode = DragMode::DraggingStart;
                idle(CursorHint::Dragging, Some(SelectionEdge::Start))
            }
            Some(SelectionEdge::End) => {
                self.mode = DragMode::DraggingEnd;
                idle(CursorHint::Dragging, Some(SelectionEdge::End))
            }
            None => {
                let anchor = geometry.px_to_time(x, selection.duration());
                self.mode = DragMode::DraggingNew { anchor };
                selection.span_between(anchor, anchor);
                InteractionOutcome {
                    cursor: CursorHint::Dragging,
                    active_edge: None,
                    selection_changed: true,
                }
            }
        }
    }

    fn drag_to(
        &mut self,
        x: f64,
        selection: &mut SelectionModel,
        geometry: TimelineGeometry,
    ) -> InteractionOutcome {
        let before = selection.selection();
        let time = geometry.px_to_time(x, selection.duration());
        let active_edge = match self.mode {
            DragMode::DraggingStart => {
                selection.drag_start_to(time);
                Some(SelectionEdge::Start)
            }
            DragMode::DraggingEnd => {
                selection.drag_end_to(time);
                Some(SelectionEdge::End)
            }
            DragMode::DraggingNew { anchor } => {
                selection.span_between(anchor, time);
                None
            }
            DragMode::None => None,
        };
        InteractionOutcome {
            cursor: CursorHint::Dragging,
            active_edge,
            selection_changed: selection.selection() != before,
        }
    }

    fn release(&mut self, selection: &mut SelectionModel) -> InteractionOutcome {
        let mode = std::mem::take(&mut self.mode);
        let mut selection_changed = false;
        if matches!(mode, DragMode::DraggingNew { .. })
            && selection.selection().span() < MIN_SPAN_SECONDS
        {
            selection.reset();
            selection_changed = true;
        }
        idle(CursorHint::Crosshair, None).with_change(selection_changed)
    }

    fn hover(
        &self,
        x: f64,
        selection: &SelectionModel,
        geometry: TimelineGeometry,
    ) -> InteractionOutcome {
        if selection.duration() <= 0.0 {
            return idle(CursorHint::Crosshair, None);
        }
        let kind = self.last_kind.unwrap_or(PointerKind::Mouse);
        let threshold = self.thresholds.for_kind(kind);
        if let Some(edge) = hit_edge(x, selection, geometry, threshold) {
            return idle(CursorHint::Resize, Some(edge));
        }
        let time = geometry.px_to_time(x, selection.duration());
        let range = selection.selection();
        if time >= range.start() && time <= range.end() {
            idle(CursorHint::Move, None)
        } else {
            idle(CursorHint::Crosshair, None)
        }
    }
}

impl InteractionOutcome {
    fn with_change(mut self, changed: bool) -> Self {
        self.selection_changed = changed;
        self
    }
}

fn idle(cursor: CursorHint, active_edge: Option<SelectionEdge>) -> InteractionOutcome {
    InteractionOutcome {
        cursor,
        active_edge,
        selection_changed: false,
    }
}

/// Start wins over end when both handles are within reach.
fn hit_edge(
    x: f64,
    selection: &SelectionModel,
    geometry: TimelineGeometry,
    threshold: f64,
) -> Option<SelectionEdge> {
    let duration = selection.duration();
    let range = selection.selection();
    let start_x = geometry.time_to_px(range.start(), duration);
    let end_x = geometry.time_to_px(range.end(), duration);
    if (x - start_x).abs() < threshold {
        Some(SelectionEdge::Start)
    } else if (x - end_x).abs() < threshold {
        Some(SelectionEdge::End)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: f64 = 1_000.0;

    fn setup(duration: f64) -> (InteractionController, SelectionModel, TimelineGeometry) {
        (
            InteractionController::default(),
            SelectionModel::new(duration),
            TimelineGeometry::new(WIDTH),
        )
    }

    fn down(x: f64) -> PointerEvent {
        PointerEvent::Down {
            x,
            kind: PointerKind::Mouse,
        }
    }

    #[test]
    fn press_near_start_drags_start() {
        let (mut controller, mut model, geometry) = setup(10.0);
        model.set_range(2.0, 8.0);
        let outcome = controller.handle(down(205.0), &mut model, geometry);
        assert_eq!(controller.mode(), DragMode::DraggingStart);
        assert_eq!(outcome.active_edge, Some(SelectionEdge::Start));
        controller.handle(PointerEvent::Move { x: 400.0 }, &mut model, geometry);
        assert!((model.selection().start() - 4.0).abs() < 1e-9);
        assert_eq!(model.selection().end(), 8.0);
    }

    #[test]
    fn start_handle_cannot_pass_end() {
        let (mut controller, mut model, geometry) = setup(10.0);
        model.set_range(2.0, 5.0);
        controller.handle(down(200.0), &mut model, geometry);
        controller.handle(PointerEvent::Move { x: 900.0 }, &mut model, geometry);
        let selection = model.selection();
        assert!((selection.start() - 4.9).abs() < 1e-9);
        assert!(selection.end() - selection.start() >= MIN_SPAN_SECONDS - 1e-12);
    }

    #[test]
    fn end_handle_cannot_pass_start() {
        let (mut controller, mut model, geometry) = setup(10.0);
        model.set_range(2.0, 5.0);
        controller.handle(down(495.0), &mut model, geometry);
        assert_eq!(controller.mode(), DragMode::DraggingEnd);
        controller.handle(PointerEvent::Move { x: -50.0 }, &mut model, geometry);
        assert!((model.selection().end() - 2.1).abs() < 1e-9);
    }

    #[test]
    fn touch_uses_wider_threshold() {
        let (mut controller, mut model, geometry) = setup(10.0);
        model.set_range(2.0, 8.0);
        controller.handle(
            PointerEvent::Down {
                x: 218.0,
                kind: PointerKind::CoarseTouch,
            },
            &mut model,
            geometry,
        );
        assert_eq!(controller.mode(), DragMode::DraggingStart);

        let (mut controller, mut model, geometry) = setup(10.0);
        model.set_range(2.0, 8.0);
        controller.handle(down(218.0), &mut model, geometry);
        assert!(matches!(controller.mode(), DragMode::DraggingNew { .. }));
    }

    #[test]
    fn new_drag_collapses_then_grows_across_anchor() {
        let (mut controller, mut model, geometry) = setup(10.0);
        controller.handle(down(500.0), &mut model, geometry);
        assert_eq!(model.selection().span(), 0.0);
        controller.handle(PointerEvent::Move { x: 700.0 }, &mut model, geometry);
        assert!((model.selection().start() - 5.0).abs() < 1e-9);
        assert!((model.selection().end() - 7.0).abs() < 1e-9);
        controller.handle(PointerEvent::Move { x: 300.0 }, &mut model, geometry);
        assert!((model.selection().start() - 3.0).abs() < 1e-9);
        assert!((model.selection().end() - 5.0).abs() < 1e-9);
        controller.handle(PointerEvent::Up, &mut model, geometry);
        assert!(!controller.is_dragging());
        assert!((model.selection().span() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_new_drag_snaps_to_full_range() {
        let (mut controller, mut model, geometry) = setup(10.0);
        model.set_range(1.0, 2.0);
        controller.handle(down(500.0), &mut model, geometry);
        controller.handle(PointerEvent::Move { x: 505.0 }, &mut model, geometry);
        let outcome = controller.handle(PointerEvent::Up, &mut model, geometry);
        assert!(outcome.selection_changed);
        assert!(model.is_full_range());
    }

    #[test]
    fn drag_moves_are_clamped_to_duration() {
        let (mut controller, mut model, geometry) = setup(10.0);
        controller.handle(down(500.0), &mut model, geometry);
        controller.handle(PointerEvent::Move { x: 5_000.0 }, &mut model, geometry);
        assert_eq!(model.selection().end(), 10.0);
        controller.handle(PointerEvent::Leave, &mut model, geometry);
        assert!(!controller.is_dragging());
    }

    #[test]
    fn hover_reports_affordance_without_mutation() {
        let (mut controller, mut model, geometry) = setup(10.0);
        model.set_range(2.0, 6.0);
        let before = model.selection();
        let near = controller.handle(PointerEvent::Move { x: 595.0 }, &mut model, geometry);
        assert_eq!(near.cursor, CursorHint::Resize);
        assert_eq!(near.active_edge, Some(SelectionEdge::End));
        let inside = controller.handle(PointerEvent::Move { x: 400.0 }, &mut model, geometry);
        assert_eq!(inside.cursor, CursorHint::Move);
        let outside = controller.handle(PointerEvent::Move { x: 900.0 }, &mut model, geometry);
        assert_eq!(outside.cursor, CursorHint::Crosshair);
        assert_eq!(model.selection(), before);
        assert!(!near.selection_changed && !inside.selection_changed);
    }

    #[test]
    fn drag_sequences_keep_min_span_or_full_range() {
        let (mut controller, mut model, geometry) = setup(10.0);
        let script = [
            (down(100.0), vec![150.0, 120.0, 80.0]),
            (down(80.0), vec![300.0, 990.0, 2.0]),
            (down(1_000.0), vec![-40.0, 0.0, 700.0]),
            (down(640.0), vec![641.0]),
            (down(0.0), vec![999.0, 1_000.0]),
        ];
        for (press, moves) in script {
            controller.handle(press, &mut model, geometry);
            for x in moves {
                controller.handle(PointerEvent::Move { x }, &mut model, geometry);
            }
            controller.handle(PointerEvent::Up, &mut model, geometry);
            let selection = model.selection();
            assert!(
                selection.span() >= MIN_SPAN_SECONDS - 1e-9 || model.is_full_range(),
                "{selection:?}"
            );
            assert!(selection.start() >= 0.0 && selection.end() <= 10.0);
        }
    }

    #[test]
    fn ignores_presses_without_signal() {
        let (mut controller, mut model, geometry) = setup(0.0);
        controller.handle(down(10.0), &mut model, geometry);
        assert!(!controller.is_dragging());
    }
}
