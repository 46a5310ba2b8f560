//! Draw state machine tests against a recording backend.

use std::collections::VecDeque;

use ash::vk::{self, Handle};
use pathview_renderer::{
    AcquireOutcome, ComputeHandoff, DrawOutcome, FrameBackend, FrameError, FrameLoop, FrameStage,
    FrameStats, FrameTarget, PresentOutcome, RebuildOutcome, SlotBindings,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MockFence {
    bundle: usize,
    generation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    WaitSlot(usize),
    WriteSlot(usize),
    SubmitCompute(usize),
    WaitBundle(usize),
    Acquire(usize),
    Record(FrameTarget),
    WaitFence(MockFence),
    SubmitGraphics(FrameTarget),
    Present(FrameTarget),
    Rebuild,
    RebuildDeferred,
}

struct MockBackend {
    slots: usize,
    images: usize,
    generation: u32,
    next_image: u32,
    events: Vec<Event>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    image_count_after_rebuild: Option<usize>,
    /// Rebuilds still to report a zero-area surface.
    deferred_rebuilds: usize,
    fail_at: Option<FrameStage>,
    bindings: Vec<SlotBindings>,
    handoffs: Vec<ComputeHandoff>,
    /// Slots whose compute submit waited on its own semaphore.
    compute_waits: Vec<usize>,
    /// Slots whose semaphore a graphics submit consumed.
    graphics_waits: Vec<usize>,
}

fn fake_bindings(slot: usize) -> SlotBindings {
    let base = 0x1000 * (slot as u64 + 1);
    SlotBindings {
        compute_set: vk::DescriptorSet::from_raw(base + 1),
        graphics_set: vk::DescriptorSet::from_raw(base + 2),
        output_image: vk::Image::from_raw(base + 3),
        output_view: vk::ImageView::from_raw(base + 4),
        camera: vk::Buffer::from_raw(base + 5),
        random: vk::Buffer::from_raw(base + 6),
        settings: vk::Buffer::from_raw(base + 7),
        spheres: vk::Buffer::from_raw(base + 8),
    }
}

impl MockBackend {
    fn new(slots: usize, images: usize) -> Self {
        Self {
            slots,
            images,
            generation: 0,
            next_image: 0,
            events: Vec::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            image_count_after_rebuild: None,
            deferred_rebuilds: 0,
            fail_at: None,
            bindings: (0..slots).map(fake_bindings).collect(),
            handoffs: vec![ComputeHandoff::new(false); slots],
            compute_waits: Vec::new(),
            graphics_waits: Vec::new(),
        }
    }

    /// Backend with a dedicated compute queue.
    fn dual(slots: usize, images: usize) -> Self {
        let mut backend = Self::new(slots, images);
        backend.handoffs = vec![ComputeHandoff::new(true); slots];
        backend
    }

    fn check(&self, stage: FrameStage) -> Result<(), FrameError> {
        if self.fail_at == Some(stage) {
            return Err(FrameError::Vulkan {
                stage,
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }
        Ok(())
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    fn rebuilds(&self) -> usize {
        self.count(|e| matches!(e, Event::Rebuild))
    }
}

impl FrameBackend for MockBackend {
    type Fence = MockFence;

    fn slot_count(&self) -> usize {
        self.slots
    }

    fn image_count(&self) -> usize {
        self.images
    }

    fn wait_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.check(FrameStage::WaitSlot)?;
        self.events.push(Event::WaitSlot(slot));
        Ok(())
    }

    fn write_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.check(FrameStage::WriteSlot)?;
        self.events.push(Event::WriteSlot(slot));
        Ok(())
    }

    fn submit_compute(&mut self, slot: usize) -> Result<(), FrameError> {
        self.check(FrameStage::SubmitCompute)?;
        self.events.push(Event::SubmitCompute(slot));
        if self.handoffs[slot].on_compute_submit() {
            self.compute_waits.push(slot);
        }
        Ok(())
    }

    fn wait_bundle(&mut self, bundle: usize) -> Result<(), FrameError> {
        self.check(FrameStage::WaitBundle)?;
        self.events.push(Event::WaitBundle(bundle));
        Ok(())
    }

    fn acquire(&mut self, bundle: usize) -> Result<AcquireOutcome, FrameError> {
        self.check(FrameStage::Acquire)?;
        self.events.push(Event::Acquire(bundle));
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.images as u32;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn record_graphics(
        &mut self,
        target: FrameTarget,
        _stats: &FrameStats,
    ) -> Result<(), FrameError> {
        self.check(FrameStage::RecordGraphics)?;
        self.events.push(Event::Record(target));
        Ok(())
    }

    fn bundle_fence(&self, bundle: usize) -> MockFence {
        MockFence {
            bundle,
            generation: self.generation,
        }
    }

    fn wait_fence(&mut self, fence: &MockFence) -> Result<(), FrameError> {
        self.check(FrameStage::WaitInFlight)?;
        self.events.push(Event::WaitFence(*fence));
        Ok(())
    }

    fn submit_graphics(&mut self, target: FrameTarget) -> Result<(), FrameError> {
        self.check(FrameStage::SubmitGraphics)?;
        self.events.push(Event::SubmitGraphics(target));
        if self.handoffs[target.slot].take_for_graphics() {
            self.graphics_waits.push(target.slot);
        }
        Ok(())
    }

    fn present(&mut self, target: FrameTarget) -> Result<PresentOutcome, FrameError> {
        self.check(FrameStage::Present)?;
        self.events.push(Event::Present(target));
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn rebuild_swapchain(&mut self) -> Result<RebuildOutcome, FrameError> {
        self.check(FrameStage::Rebuild)?;
        if self.deferred_rebuilds > 0 {
            self.deferred_rebuilds -= 1;
            self.events.push(Event::RebuildDeferred);
            return Ok(RebuildOutcome::Deferred);
        }
        self.events.push(Event::Rebuild);
        self.generation += 1;
        self.next_image = 0;
        if let Some(images) = self.image_count_after_rebuild.take() {
            self.images = images;
        }
        Ok(RebuildOutcome::Rebuilt)
    }

    fn slot_bindings(&self, slot: usize) -> SlotBindings {
        self.bindings[slot]
    }
}

fn acquired(image_index: u32) -> AcquireOutcome {
    AcquireOutcome::Acquired {
        image_index,
        suboptimal: false,
    }
}

#[test]
fn test_frame_index_sequence_two_slots_three_images() {
    let mut frame_loop = FrameLoop::new(MockBackend::new(2, 3));

    let mut sequence = Vec::new();
    for _ in 0..10 {
        let outcome = frame_loop.draw().expect("no fatal error");
        assert_eq!(outcome, DrawOutcome::Success);
        sequence.push(frame_loop.frame_index());
    }

    assert_eq!(sequence, vec![1, 0, 1, 0, 1, 0, 1, 0, 1, 0]);
    assert_eq!(frame_loop.backend().rebuilds(), 0);
    assert_eq!(frame_loop.frames_drawn(), 10);
}

#[test]
fn test_frame_index_is_draw_count_modulo_slots() {
    for slots in 1..=4 {
        let mut frame_loop = FrameLoop::new(MockBackend::new(slots, 3));
        for drawn in 1..=13 {
            frame_loop.draw().expect("no fatal error");
            assert_eq!(frame_loop.frame_index(), drawn % slots, "N = {}", slots);
        }
    }
}

#[test]
fn test_slot_fence_waited_right_before_buffer_write() {
    let mut frame_loop = FrameLoop::new(MockBackend::new(2, 3));
    for _ in 0..6 {
        frame_loop.draw().expect("no fatal error");
    }

    let events = &frame_loop.backend().events;
    let mut writes = 0;
    for (i, event) in events.iter().enumerate() {
        if let Event::WriteSlot(slot) = event {
            writes += 1;
            assert!(i > 0);
            assert_eq!(events[i - 1], Event::WaitSlot(*slot));
        }
    }
    assert_eq!(writes, 6);
}

#[test]
fn test_stage_order_of_one_frame() {
    let mut frame_loop = FrameLoop::new(MockBackend::new(2, 3));
    frame_loop.draw().expect("no fatal error");

    let target = FrameTarget {
        slot: 0,
        bundle: 0,
        image_index: 0,
    };
    assert_eq!(
        frame_loop.backend().events,
        vec![
            Event::WaitSlot(0),
            Event::WriteSlot(0),
            Event::SubmitCompute(0),
            Event::WaitBundle(0),
            Event::Acquire(0),
            Event::Record(target),
            Event::SubmitGraphics(target),
            Event::Present(target),
        ]
    );
}

#[test]
fn test_stale_acquire_rebuilds_once_and_skips_frame() {
    let mut backend = MockBackend::new(2, 3);
    // Draws 1-3 take the scripted images, draw 4 finds the swapchain stale.
    backend.acquire_script = VecDeque::from([
        acquired(0),
        acquired(1),
        acquired(2),
        AcquireOutcome::Stale,
    ]);
    let mut frame_loop = FrameLoop::new(backend);

    for _ in 0..3 {
        assert_eq!(frame_loop.draw().expect("draw"), DrawOutcome::Success);
    }
    let index_before = frame_loop.frame_index();
    let presents_before = frame_loop
        .backend()
        .count(|e| matches!(e, Event::Present(_)));

    assert_eq!(
        frame_loop.draw().expect("draw 4"),
        DrawOutcome::SwapchainOutOfDate
    );
    assert_eq!(frame_loop.backend().rebuilds(), 1);
    assert_eq!(frame_loop.frame_index(), index_before);
    assert_eq!(frame_loop.in_flight().occupied(), 0);
    assert_eq!(
        frame_loop
            .backend()
            .count(|e| matches!(e, Event::Present(_))),
        presents_before
    );

    assert_eq!(frame_loop.draw().expect("draw 5"), DrawOutcome::Success);
    assert_eq!(frame_loop.backend().rebuilds(), 1);
    assert_eq!(frame_loop.frame_index(), (index_before + 1) % 2);
}

#[test]
fn test_in_flight_wait_on_reused_image() {
    let mut backend = MockBackend::new(2, 3);
    backend.acquire_script = VecDeque::from([acquired(0), acquired(1), acquired(0)]);
    let mut frame_loop = FrameLoop::new(backend);

    frame_loop.draw().expect("draw 1");
    frame_loop.draw().expect("draw 2");
    assert_eq!(
        frame_loop
            .backend()
            .count(|e| matches!(e, Event::WaitFence(_))),
        0
    );

    // Third draw uses bundle 2 but lands on image 0, last drawn by bundle 0.
    frame_loop.draw().expect("draw 3");
    let waits: Vec<_> = frame_loop
        .backend()
        .events
        .iter()
        .filter_map(|e| match e {
            Event::WaitFence(fence) => Some(*fence),
            _ => None,
        })
        .collect();
    assert_eq!(
        waits,
        vec![MockFence {
            bundle: 0,
            generation: 0
        }]
    );
    assert_eq!(
        frame_loop.in_flight().get(0),
        Some(&MockFence {
            bundle: 2,
            generation: 0
        })
    );
    assert_eq!(frame_loop.in_flight().occupied(), 2);
}

#[test]
fn test_in_flight_holds_one_fence_per_image() {
    let mut frame_loop = FrameLoop::new(MockBackend::new(2, 3));
    for _ in 0..20 {
        frame_loop.draw().expect("no fatal error");
        assert!(frame_loop.in_flight().occupied() <= 3);
        assert_eq!(frame_loop.in_flight().len(), 3);
    }
}

#[test]
fn test_stale_present_rebuilds_but_frame_succeeds() {
    let mut backend = MockBackend::new(2, 3);
    backend.present_script = VecDeque::from([PresentOutcome::Presented, PresentOutcome::Stale]);
    let mut frame_loop = FrameLoop::new(backend);

    assert_eq!(frame_loop.draw().expect("draw 1"), DrawOutcome::Success);
    assert_eq!(frame_loop.draw().expect("draw 2"), DrawOutcome::Success);
    assert_eq!(frame_loop.backend().rebuilds(), 1);
    assert_eq!(frame_loop.frame_index(), 0);
    assert_eq!(frame_loop.in_flight().occupied(), 0);

    assert_eq!(frame_loop.draw().expect("draw 3"), DrawOutcome::Success);
    assert_eq!(frame_loop.backend().rebuilds(), 1);
}

#[test]
fn test_resize_request_rebuilds_after_present() {
    let mut frame_loop = FrameLoop::new(MockBackend::new(2, 3));
    frame_loop.draw().expect("draw 1");

    frame_loop.request_resize();
    assert!(frame_loop.resize_requested());
    frame_loop.draw().expect("draw 2");

    assert!(!frame_loop.resize_requested());
    let events = &frame_loop.backend().events;
    assert_eq!(events.last(), Some(&Event::Rebuild));
    assert!(matches!(events[events.len() - 2], Event::Present(_)));

    frame_loop.draw().expect("draw 3");
    assert_eq!(frame_loop.backend().rebuilds(), 1);
}

#[test]
fn test_consecutive_rebuilds_each_leave_valid_state() {
    let mut backend = MockBackend::new(2, 3);
    backend.acquire_script = VecDeque::from([AcquireOutcome::Stale, AcquireOutcome::Stale]);
    let mut frame_loop = FrameLoop::new(backend);

    for _ in 0..2 {
        assert_eq!(
            frame_loop.draw().expect("stale draw"),
            DrawOutcome::SwapchainOutOfDate
        );
        assert_eq!(frame_loop.in_flight().len(), 3);
        assert_eq!(frame_loop.in_flight().occupied(), 0);
    }
    assert_eq!(frame_loop.backend().rebuilds(), 2);
    assert_eq!(frame_loop.frame_index(), 0);

    assert_eq!(frame_loop.draw().expect("draw"), DrawOutcome::Success);
    assert_eq!(frame_loop.frame_index(), 1);
}

#[test]
fn test_rebuild_follows_new_image_count() {
    let mut backend = MockBackend::new(2, 3);
    backend.image_count_after_rebuild = Some(2);
    let mut frame_loop = FrameLoop::new(backend);

    frame_loop.draw().expect("draw 1");
    frame_loop.draw().expect("draw 2");
    frame_loop.draw().expect("draw 3");
    assert_eq!(frame_loop.bundle_cursor(), 0);
    frame_loop.draw().expect("draw 4");
    assert_eq!(frame_loop.bundle_cursor(), 1);

    frame_loop.request_resize();
    frame_loop.draw().expect("draw 5");
    assert_eq!(frame_loop.in_flight().len(), 2);
    assert!(frame_loop.bundle_cursor() < 2);

    for _ in 0..5 {
        frame_loop.draw().expect("draw after rebuild");
        assert!(frame_loop.bundle_cursor() < 2);
    }
}

#[test]
fn test_fatal_error_aborts_frame() {
    let mut backend = MockBackend::new(2, 3);
    backend.fail_at = Some(FrameStage::SubmitGraphics);
    let mut frame_loop = FrameLoop::new(backend);

    let err = frame_loop.draw().expect_err("submit fails");
    assert_eq!(err.stage(), FrameStage::SubmitGraphics);
    assert_eq!(frame_loop.frame_index(), 0);
    assert_eq!(frame_loop.frames_drawn(), 0);
    assert!(
        !frame_loop
            .backend()
            .events
            .iter()
            .any(|e| matches!(e, Event::Present(_)))
    );
}

#[test]
fn test_fatal_acquire_error_is_not_a_rebuild() {
    let mut backend = MockBackend::new(2, 3);
    backend.fail_at = Some(FrameStage::Acquire);
    let mut frame_loop = FrameLoop::new(backend);

    let err = frame_loop.draw().expect_err("acquire fails");
    assert!(matches!(
        err,
        FrameError::Vulkan {
            stage: FrameStage::Acquire,
            result: vk::Result::ERROR_DEVICE_LOST
        }
    ));
    assert_eq!(frame_loop.backend().rebuilds(), 0);
}

#[test]
fn test_bundle_cursor_wraps_over_images() {
    let mut frame_loop = FrameLoop::new(MockBackend::new(2, 3));
    let mut bundles = Vec::new();
    for _ in 0..7 {
        frame_loop.draw().expect("draw");
        bundles.push(frame_loop.bundle_cursor());
    }
    assert_eq!(bundles, vec![1, 2, 0, 1, 2, 0, 1]);
}

#[test]
fn test_stale_acquire_satisfies_pending_resize() {
    let mut backend = MockBackend::new(2, 3);
    backend.acquire_script = VecDeque::from([acquired(0), AcquireOutcome::Stale]);
    let mut frame_loop = FrameLoop::new(backend);

    frame_loop.draw().expect("draw 1");
    frame_loop.request_resize();
    assert_eq!(
        frame_loop.draw().expect("draw 2"),
        DrawOutcome::SwapchainOutOfDate
    );
    assert_eq!(frame_loop.backend().rebuilds(), 1);
    assert!(!frame_loop.resize_requested());

    assert_eq!(frame_loop.draw().expect("draw 3"), DrawOutcome::Success);
    assert_eq!(frame_loop.backend().rebuilds(), 1);
}

#[test]
fn test_zero_area_surface_defers_resize() {
    let mut backend = MockBackend::new(2, 3);
    backend.deferred_rebuilds = 2;
    let mut frame_loop = FrameLoop::new(backend);

    frame_loop.request_resize();
    for _ in 0..2 {
        assert_eq!(frame_loop.draw().expect("minimized draw"), DrawOutcome::Success);
        assert!(frame_loop.resize_requested());
    }
    assert_eq!(frame_loop.backend().rebuilds(), 0);
    assert_eq!(
        frame_loop
            .backend()
            .count(|e| matches!(e, Event::RebuildDeferred)),
        2
    );

    // Surface has an area again.
    assert_eq!(frame_loop.draw().expect("restored draw"), DrawOutcome::Success);
    assert_eq!(frame_loop.backend().rebuilds(), 1);
    assert!(!frame_loop.resize_requested());
    assert_eq!(frame_loop.in_flight().occupied(), 0);
}

#[test]
fn test_zero_area_surface_on_stale_acquire_is_retried() {
    let mut backend = MockBackend::new(2, 3);
    backend.acquire_script = VecDeque::from([AcquireOutcome::Stale]);
    backend.deferred_rebuilds = 1;
    let mut frame_loop = FrameLoop::new(backend);

    assert_eq!(
        frame_loop.draw().expect("stale draw"),
        DrawOutcome::SwapchainOutOfDate
    );
    assert!(frame_loop.resize_requested());
    assert_eq!(frame_loop.backend().rebuilds(), 0);

    // The acquire succeeds again; the pending resize rebuilds after present.
    assert_eq!(frame_loop.draw().expect("next draw"), DrawOutcome::Success);
    assert_eq!(frame_loop.backend().rebuilds(), 1);
    assert!(!frame_loop.resize_requested());
}

#[test]
fn test_failed_rebuild_is_still_fatal() {
    let mut backend = MockBackend::new(2, 3);
    backend.fail_at = Some(FrameStage::Rebuild);
    let mut frame_loop = FrameLoop::new(backend);

    frame_loop.request_resize();
    let err = frame_loop.draw().expect_err("rebuild fails");
    assert_eq!(err.stage(), FrameStage::Rebuild);
}

#[test]
fn test_slot_bindings_stable_across_many_frames() {
    const SLOTS: usize = 3;
    let mut backend = MockBackend::new(SLOTS, 3);
    backend.present_script = VecDeque::from(
        (0..SLOTS * 300)
            .map(|i| {
                if i % 97 == 96 {
                    PresentOutcome::Stale
                } else {
                    PresentOutcome::Presented
                }
            })
            .collect::<Vec<_>>(),
    );
    let mut frame_loop = FrameLoop::new(backend);

    let snapshot: Vec<SlotBindings> = (0..SLOTS)
        .map(|slot| frame_loop.backend().slot_bindings(slot))
        .collect();
    for (i, a) in snapshot.iter().enumerate() {
        for b in &snapshot[i + 1..] {
            assert_ne!(a.compute_set, b.compute_set);
            assert_ne!(a.output_image, b.output_image);
        }
    }

    for frame in 0..SLOTS * 300 {
        if frame % 250 == 249 {
            frame_loop.request_resize();
        }
        frame_loop.draw().expect("no fatal error");
    }
    assert!(frame_loop.backend().rebuilds() > 0);

    let after: Vec<SlotBindings> = (0..SLOTS)
        .map(|slot| frame_loop.backend().slot_bindings(slot))
        .collect();
    assert_eq!(after, snapshot);
}

#[test]
fn test_compute_semaphore_consumed_once_per_frame() {
    let mut frame_loop = FrameLoop::new(MockBackend::dual(2, 3));
    for _ in 0..8 {
        frame_loop.draw().expect("no fatal error");
    }

    let backend = frame_loop.backend();
    assert!(backend.compute_waits.is_empty());
    assert_eq!(backend.graphics_waits, vec![0, 1, 0, 1, 0, 1, 0, 1]);
    assert!(backend.handoffs.iter().all(|h| !h.is_pending()));
}

#[test]
fn test_dropped_frame_signal_consumed_by_next_compute() {
    let mut backend = MockBackend::dual(2, 3);
    backend.acquire_script = VecDeque::from([acquired(0), AcquireOutcome::Stale]);
    let mut frame_loop = FrameLoop::new(backend);

    frame_loop.draw().expect("draw 1");
    assert_eq!(
        frame_loop.draw().expect("draw 2"),
        DrawOutcome::SwapchainOutOfDate
    );
    // Slot 1 signaled its semaphore but no graphics submit consumed it.
    assert!(frame_loop.backend().handoffs[1].is_pending());
    assert_eq!(frame_loop.backend().graphics_waits, vec![0]);

    frame_loop.draw().expect("draw 3");
    let backend = frame_loop.backend();
    assert_eq!(backend.compute_waits, vec![1]);
    assert_eq!(backend.graphics_waits, vec![0, 1]);
    assert!(!backend.handoffs[1].is_pending());
}
