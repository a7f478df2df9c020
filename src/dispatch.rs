use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::backend::ChartBackend;
use crate::chart::{ChartController, RenderOutcome};
use crate::data::Properties;
use crate::page::Page;
use crate::selection::SelectionState;

/// Broadcast when the attribute selector changes
#[derive(Debug, Clone)]
pub struct SelectionEvent {
    pub selected_key: String,
    pub data: Rc<[Properties]>,
}

pub trait SelectionListener {
    fn on_selection(&mut self, event: &SelectionEvent) -> Result<()>;
}

impl<F> SelectionListener for F
where
    F: FnMut(&SelectionEvent) -> Result<()>,
{
    fn on_selection(&mut self, event: &SelectionEvent) -> Result<()> {
        self(event)
    }
}

pub type Listener = Rc<RefCell<dyn SelectionListener>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Single-threaded event bus. Listeners run in subscription order; one
/// failing listener does not stop the others.
#[derive(Default)]
pub struct Dispatcher {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener. Returns how many handled it.
    pub fn emit(&self, event: &SelectionEvent) -> usize {
        let mut handled = 0;
        for (id, listener) in &self.listeners {
            // A listener that is already running (re-entrant emit) is skipped
            let Ok(mut listener) = listener.try_borrow_mut() else {
                warn!(listener = id.0, "listener busy, event dropped");
                continue;
            };
            match listener.on_selection(event) {
                Ok(()) => handled += 1,
                Err(e) => error!(
                    listener = id.0,
                    key = %event.selected_key,
                    error = %format!("{:#}", e),
                    "selection listener failed"
                ),
            }
        }
        debug!(key = %event.selected_key, handled, "selection dispatched");
        handled
    }
}

/// Draws a categorical doughnut of the selected key onto one canvas.
pub struct ChartListener<B: ChartBackend> {
    page: Rc<RefCell<Page>>,
    target: String,
    controller: ChartController<B>,
    last: Option<RenderOutcome>,
}

impl<B: ChartBackend> ChartListener<B> {
    pub fn new(page: Rc<RefCell<Page>>, target: impl Into<String>, controller: ChartController<B>) -> Self {
        Self {
            page,
            target: target.into(),
            controller,
            last: None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn controller(&self) -> &ChartController<B> {
        &self.controller
    }

    pub fn last_outcome(&self) -> Option<RenderOutcome> {
        self.last
    }
}

impl<B: ChartBackend> SelectionListener for ChartListener<B> {
    fn on_selection(&mut self, event: &SelectionEvent) -> Result<()> {
        let selection = SelectionState::categorical(event.selected_key.as_str());
        let mut page = self.page.borrow_mut();
        let outcome = self
            .controller
            .render(&mut page, &self.target, &selection, &event.data)?;
        self.last = Some(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::chart::RendererOptions;
    use crate::data::PropertyValue;
    use anyhow::anyhow;

    fn event(key: &str) -> SelectionEvent {
        let data: Vec<Properties> = vec![
            Properties::new().with("zone", PropertyValue::Text("r".into())),
            Properties::new().with("zone", PropertyValue::Text("c".into())),
            Properties::new().with("zone", PropertyValue::Text("r".into())),
        ];
        SelectionEvent {
            selected_key: key.to_string(),
            data: Rc::from(data),
        }
    }

    #[test]
    fn test_emit_in_subscription_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        for name in ["first", "second"] {
            let seen = Rc::clone(&seen);
            dispatcher.subscribe(Rc::new(RefCell::new(move |e: &SelectionEvent| -> Result<()> {
                seen.borrow_mut().push(format!("{}:{}", name, e.selected_key));
                Ok(())
            })));
        }
        assert_eq!(dispatcher.emit(&event("zone")), 2);
        assert_eq!(*seen.borrow(), vec!["first:zone", "second:zone"]);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let calls = Rc::new(RefCell::new(0));
        let mut dispatcher = Dispatcher::new();
        dispatcher.subscribe(Rc::new(RefCell::new(|_: &SelectionEvent| -> Result<()> {
            Err(anyhow!("boom"))
        })));
        let counter = Rc::clone(&calls);
        dispatcher.subscribe(Rc::new(RefCell::new(move |_: &SelectionEvent| -> Result<()> {
            *counter.borrow_mut() += 1;
            Ok(())
        })));
        assert_eq!(dispatcher.emit(&event("zone")), 1);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let mut dispatcher = Dispatcher::new();
        let id = dispatcher.subscribe(Rc::new(RefCell::new(|_: &SelectionEvent| -> Result<()> { Ok(()) })));
        assert_eq!(dispatcher.len(), 1);
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.emit(&event("zone")), 0);
    }

    #[test]
    fn test_chart_listeners_share_page() {
        let page = Rc::new(RefCell::new(
            Page::new().with_canvas("pieChart").with_canvas("pieChart1"),
        ));
        let mut dispatcher = Dispatcher::new();
        let listeners: Vec<_> = ["pieChart", "pieChart1"]
            .into_iter()
            .map(|target| {
                Rc::new(RefCell::new(ChartListener::new(
                    Rc::clone(&page),
                    target,
                    ChartController::new(RecordingBackend::new(), RendererOptions::default()),
                )))
            })
            .collect();
        for listener in &listeners {
            dispatcher.subscribe(listener.clone());
        }

        assert_eq!(dispatcher.emit(&event("zone")), 2);
        for listener in &listeners {
            let l = listener.borrow();
            assert_eq!(l.last_outcome(), Some(RenderOutcome::Rendered));
            let config = l.controller().backend().last_config(l.target()).unwrap();
            assert_eq!(config.data.labels, vec!["r", "c"]);
            assert_eq!(config.data.datasets[0].data, vec![2.0, 1.0]);
        }
    }

    #[test]
    fn test_chart_listener_missing_canvas() {
        let page = Rc::new(RefCell::new(Page::new()));
        let mut listener = ChartListener::new(
            page,
            "pieChart1",
            ChartController::new(RecordingBackend::new(), RendererOptions::default()),
        );
        listener.on_selection(&event("zone")).unwrap();
        assert_eq!(
            listener.last_outcome(),
            Some(RenderOutcome::Skipped(crate::chart::SkipReason::MissingCanvas))
        );
    }
}
