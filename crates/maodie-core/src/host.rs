//! Seams between the simulation and whatever hosts it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::platform::{ElementBox, Platform};
use crate::spider::Transform;
use crate::world::SpiderId;
use crate::{SpiderConfig, Viewport};

/// Read-only view of the host document's layout.
pub trait PageLayout {
    /// Current scroll offsets and extents, or `None` once the host context is gone.
    fn viewport(&self) -> Option<Viewport>;

    /// Candidate content elements with their client rects and visibility facts.
    fn elements(&self) -> Vec<ElementBox>;
}

/// Visual side of the effect. The world only ever creates, moves, and destroys sprites.
pub trait Presenter {
    /// One-time setup before the first spider appears.
    fn mount(&mut self, _config: &SpiderConfig) {}

    /// Release everything created by [`Presenter::mount`].
    fn unmount(&mut self) {}

    fn create(&mut self, id: SpiderId, width: f64, height: f64);

    fn update(&mut self, id: SpiderId, transform: &Transform);

    fn destroy(&mut self, id: SpiderId);

    /// Debug outlines of the current platforms.
    fn draw_platforms(&mut self, _platforms: &[Platform], _viewport: &Viewport) {}
}

/// Presenter that draws nothing (headless worlds, benchmarks).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn create(&mut self, _id: SpiderId, _width: f64, _height: f64) {}

    fn update(&mut self, _id: SpiderId, _transform: &Transform) {}

    fn destroy(&mut self, _id: SpiderId) {}
}

/// Calls observed by a [`RecordingPresenter`].
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    Mount,
    Unmount,
    Create(SpiderId),
    Update(SpiderId, Transform),
    Destroy(SpiderId),
    DrawPlatforms(usize),
}

/// Presenter that logs every call into a shared buffer. Clones share the buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingPresenter {
    events: Rc<RefCell<Vec<PresenterEvent>>>,
}

impl RecordingPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.borrow().clone()
    }

    /// Number of sprites created and not yet destroyed.
    #[must_use]
    pub fn live_sprites(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .fold(0_isize, |live, event| match event {
                PresenterEvent::Create(_) => live + 1,
                PresenterEvent::Destroy(_) => live - 1,
                _ => live,
            })
            .max(0) as usize
    }

    fn record(&self, event: PresenterEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Presenter for RecordingPresenter {
    fn mount(&mut self, _config: &SpiderConfig) {
        self.record(PresenterEvent::Mount);
    }

    fn unmount(&mut self) {
        self.record(PresenterEvent::Unmount);
    }

    fn create(&mut self, id: SpiderId, _width: f64, _height: f64) {
        self.record(PresenterEvent::Create(id));
    }

    fn update(&mut self, id: SpiderId, transform: &Transform) {
        self.record(PresenterEvent::Update(id, *transform));
    }

    fn destroy(&mut self, id: SpiderId) {
        self.record(PresenterEvent::Destroy(id));
    }

    fn draw_platforms(&mut self, platforms: &[Platform], _viewport: &Viewport) {
        self.record(PresenterEvent::DrawPlatforms(platforms.len()));
    }
}

#[derive(Debug)]
struct LayoutState {
    viewport: Option<Viewport>,
    elements: Vec<ElementBox>,
}

/// In-memory page layout. Clones share state, so a test or headless embedder can keep a
/// handle and change the page after the world took ownership of its copy.
#[derive(Debug, Clone)]
pub struct StaticLayout {
    state: Rc<RefCell<LayoutState>>,
}

impl StaticLayout {
    #[must_use]
    pub fn new(viewport: Viewport, elements: Vec<ElementBox>) -> Self {
        Self {
            state: Rc::new(RefCell::new(LayoutState {
                viewport: Some(viewport),
                elements,
            })),
        }
    }

    pub fn set_elements(&self, elements: Vec<ElementBox>) {
        self.state.borrow_mut().elements = elements;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.borrow_mut().viewport = Some(viewport);
    }

    /// Simulate the host context going away: no viewport, no elements.
    pub fn detach(&self) {
        let mut state = self.state.borrow_mut();
        state.viewport = None;
        state.elements.clear();
    }
}

impl Default for StaticLayout {
    fn default() -> Self {
        Self::new(Viewport::default(), Vec::new())
    }
}

impl PageLayout for StaticLayout {
    fn viewport(&self) -> Option<Viewport> {
        self.state.borrow().viewport
    }

    fn elements(&self) -> Vec<ElementBox> {
        self.state.borrow().elements.clone()
    }
}
