// Page model and the two page controllers (direct and broadcast wiring)

use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

use crate::attributes::{extract_from_payload, Extraction};
use crate::backend::ChartBackend;
use crate::chart::{ChartController, RenderOutcome};
use crate::config::PageConfig;
use crate::data::Properties;
use crate::dispatch::{Dispatcher, Listener, SelectionEvent, SubscriptionId};
use crate::selection::{ChartType, SelectionState};
use crate::store::{choose_layer, resolve_layer, KeyValueStore, LayerResolution};

/// Prompt shown in the attribute selector until something is picked
pub const ATTRIBUTE_PROMPT: &str = "Pick an attribute";

/// A `<select>`-like control
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    options: Vec<String>,
    value: Option<String>,
    prompt: Option<String>,
    visible: bool,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            value: None,
            prompt: None,
            visible: true,
        }
    }
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with the first one selected
    pub fn with_options<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selector = Self::new();
        selector.populate(options.into_iter().map(Into::into).collect(), None);
        selector
    }

    /// Replace the options. With a prompt nothing is selected, otherwise the
    /// first option is.
    pub fn populate(&mut self, options: Vec<String>, prompt: Option<&str>) {
        self.value = match prompt {
            Some(_) => None,
            None => options.first().cloned(),
        };
        self.prompt = prompt.map(str::to_string);
        self.options = options;
    }

    /// Select `value` if it is one of the options.
    pub fn set_value(&mut self, value: &str) -> bool {
        if self.options.iter().any(|o| o == value) {
            self.value = Some(value.to_string());
            true
        } else {
            false
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Select(Selector),
    Canvas,
    Placeholder { visible: bool },
    /// Embedded text payload, e.g. the GeoJSON script tag
    Data(String),
}

/// The elements a page exposes, keyed by id, plus its URL query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    elements: HashMap<String, Element>,
    placeholder: Option<String>,
    query: String,
    navigation: Option<String>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_canvas(mut self, id: impl Into<String>) -> Self {
        self.elements.insert(id.into(), Element::Canvas);
        self
    }

    pub fn with_placeholder(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.elements
            .insert(id.clone(), Element::Placeholder { visible: true });
        self.placeholder = Some(id);
        self
    }

    pub fn with_select(mut self, id: impl Into<String>, selector: Selector) -> Self {
        self.elements.insert(id.into(), Element::Select(selector));
        self
    }

    pub fn with_data(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.elements.insert(id.into(), Element::Data(text.into()));
        self
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn has_canvas(&self, id: &str) -> bool {
        matches!(self.elements.get(id), Some(Element::Canvas))
    }

    pub fn select(&self, id: &str) -> Option<&Selector> {
        match self.elements.get(id) {
            Some(Element::Select(s)) => Some(s),
            _ => None,
        }
    }

    pub fn select_mut(&mut self, id: &str) -> Option<&mut Selector> {
        match self.elements.get_mut(id) {
            Some(Element::Select(s)) => Some(s),
            _ => None,
        }
    }

    pub fn data(&self, id: &str) -> Option<&str> {
        match self.elements.get(id) {
            Some(Element::Data(text)) => Some(text),
            _ => None,
        }
    }

    /// `None` when the page has no placeholder
    pub fn placeholder_visible(&self) -> Option<bool> {
        let id = self.placeholder.as_ref()?;
        match self.elements.get(id) {
            Some(Element::Placeholder { visible }) => Some(*visible),
            _ => None,
        }
    }

    pub fn hide_placeholder(&mut self) {
        if let Some(id) = &self.placeholder {
            if let Some(Element::Placeholder { visible }) = self.elements.get_mut(id) {
                *visible = false;
            }
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Full navigation: the page is finished once this is set.
    pub fn navigate(&mut self, url: impl Into<String>) {
        self.navigation = Some(url.into());
    }

    pub fn navigation(&self) -> Option<&str> {
        self.navigation.as_deref()
    }

    /// Select `value` on selector `id`. Pages without that selector accept anything.
    fn accept(&mut self, id: &str, value: &str) -> bool {
        match self.select_mut(id) {
            Some(selector) => selector.set_value(value),
            None => true,
        }
    }
}

/// How a page load ended
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The stored layer sent the page elsewhere
    Redirected(String),
    /// No embedded data element
    NoData,
    /// The payload could not be parsed (logged)
    Invalid,
    /// The payload has no features
    Empty,
    /// Selectors populated; `rendered` says whether a chart was drawn
    Ready { rendered: bool },
}

/// Reconcile the layer selector with the URL and storage.
/// Returns the redirect URL when the page must navigate away.
fn apply_layer(
    page: &mut Page,
    store: &mut dyn KeyValueStore,
    config: &PageConfig,
) -> Result<Option<String>> {
    let layer_id = &config.elements.layer_selector;
    if page.select(layer_id).is_none() {
        return Ok(None);
    }

    match resolve_layer(page.query(), store, &config.storage.layer)? {
        LayerResolution::Redirect(url) => {
            info!(%url, "restoring stored layer");
            page.navigate(url.clone());
            Ok(Some(url))
        }
        LayerResolution::Active(id) => {
            if let Some(selector) = page.select_mut(layer_id) {
                if !selector.set_value(&id) {
                    debug!(layer = %id, "layer not among selector options");
                }
            }
            Ok(None)
        }
        LayerResolution::Unset => Ok(None),
    }
}

/// Read and extract the embedded payload. Errors are logged, never raised.
fn load_payload(page: &Page, config: &PageConfig) -> Result<Extraction, LoadOutcome> {
    let Some(text) = page.data(&config.elements.data) else {
        debug!(id = %config.elements.data, "no data element");
        return Err(LoadOutcome::NoData);
    };

    match extract_from_payload(text) {
        Ok(Some(extraction)) => Ok(extraction),
        Ok(None) => {
            debug!("feature collection is empty");
            Err(LoadOutcome::Empty)
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "GeoJSON processing error");
            Err(LoadOutcome::Invalid)
        }
    }
}

// =============================================================================
// Direct wiring: selector change handlers call the renderer themselves
// =============================================================================

pub struct ChartPage<B: ChartBackend> {
    page: Page,
    store: Box<dyn KeyValueStore>,
    controller: ChartController<B>,
    config: PageConfig,
    records: Rc<[Properties]>,
    selection: SelectionState,
}

impl<B: ChartBackend> ChartPage<B> {
    pub fn new(
        page: Page,
        store: Box<dyn KeyValueStore>,
        controller: ChartController<B>,
        config: PageConfig,
    ) -> Self {
        Self {
            page,
            store,
            controller,
            config,
            records: Rc::from(Vec::new()),
            selection: SelectionState::default(),
        }
    }

    /// Page-ready handler: layer redirect, extraction, selector population,
    /// restore of the stored selection and the initial render.
    pub fn load(&mut self) -> Result<LoadOutcome> {
        if let Some(url) = apply_layer(&mut self.page, self.store.as_mut(), &self.config)? {
            return Ok(LoadOutcome::Redirected(url));
        }

        let extraction = match load_payload(&self.page, &self.config) {
            Ok(extraction) => extraction,
            Err(outcome) => return Ok(outcome),
        };

        let ids = self.config.elements.clone();
        if let Some(keys) = self.page.select_mut(&ids.key_selector) {
            keys.populate(extraction.attributes.clone(), Some(ATTRIBUTE_PROMPT));
        }
        if let Some(ys) = self.page.select_mut(&ids.y_selector) {
            ys.populate(extraction.numeric_attributes.clone(), None);
        }
        if let Some(types) = self.page.select_mut(&ids.chart_type_selector) {
            if types.options().is_empty() {
                types.populate(
                    ChartType::all().iter().map(|t| t.as_str().to_string()).collect(),
                    None,
                );
            }
        }
        self.records = extraction.records;

        // Restored values only stick when the selectors offer them
        let stored = SelectionState::restore(self.store.as_ref(), &self.config.storage);
        self.selection = SelectionState {
            attribute: None,
            y_key: self.page.select(&ids.y_selector).and_then(|s| s.value().map(str::to_string)),
            chart_type: stored.chart_type,
        };
        if let Some(attribute) = stored.attribute {
            if self.page.accept(&ids.key_selector, &attribute) {
                self.selection.attribute = Some(attribute);
            }
        }
        if let Some(y_key) = stored.y_key {
            if self.page.accept(&ids.y_selector, &y_key) {
                self.selection.y_key = Some(y_key);
            }
        }
        self.page
            .accept(&ids.chart_type_selector, self.selection.chart_type.as_str());

        let outcome = self.update_chart()?;
        Ok(LoadOutcome::Ready {
            rendered: outcome == RenderOutcome::Rendered,
        })
    }

    /// Persist the selection, toggle the Y selector, redraw.
    pub fn update_chart(&mut self) -> Result<RenderOutcome> {
        if let Err(e) = self
            .selection
            .persist(self.store.as_mut(), &self.config.storage)
        {
            warn!(error = %format!("{:#}", e), "could not persist selection");
        }

        let is_bar = self.selection.chart_type == ChartType::Bar;
        if let Some(ys) = self.page.select_mut(&self.config.elements.y_selector) {
            ys.set_visible(is_bar);
        }

        let canvas = self.config.elements.canvas.clone();
        self.controller
            .render(&mut self.page, &canvas, &self.selection, &self.records)
    }

    pub fn on_key_change(&mut self, value: &str) -> Result<RenderOutcome> {
        if self.page.accept(&self.config.elements.key_selector, value) {
            self.selection.attribute = Some(value.to_string());
        }
        self.update_chart()
    }

    pub fn on_y_change(&mut self, value: &str) -> Result<RenderOutcome> {
        if self.page.accept(&self.config.elements.y_selector, value) {
            self.selection.y_key = Some(value.to_string());
        }
        self.update_chart()
    }

    pub fn on_chart_type_change(&mut self, chart_type: ChartType) -> Result<RenderOutcome> {
        if self
            .page
            .accept(&self.config.elements.chart_type_selector, chart_type.as_str())
        {
            self.selection.chart_type = chart_type;
        }
        self.update_chart()
    }

    /// Layer selector change: remember it and navigate to the new layer.
    pub fn on_layer_change(&mut self, layer_id: &str) -> Result<String> {
        let url = choose_layer(layer_id, self.store.as_mut(), &self.config.storage.layer)?;
        self.page.navigate(url.clone());
        Ok(url)
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn records(&self) -> &[Properties] {
        &self.records
    }

    pub fn controller(&self) -> &ChartController<B> {
        &self.controller
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Tear the page down, handing back its store for the next load.
    pub fn into_store(self) -> Box<dyn KeyValueStore> {
        self.store
    }
}

// =============================================================================
// Broadcast wiring: the selector emits, independent chart listeners react
// =============================================================================

pub struct SelectorPage {
    page: Rc<RefCell<Page>>,
    store: Box<dyn KeyValueStore>,
    config: PageConfig,
    dispatcher: Dispatcher,
    records: Rc<[Properties]>,
}

impl SelectorPage {
    pub fn new(page: Rc<RefCell<Page>>, store: Box<dyn KeyValueStore>, config: PageConfig) -> Self {
        Self {
            page,
            store,
            config,
            dispatcher: Dispatcher::new(),
            records: Rc::from(Vec::new()),
        }
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.dispatcher.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Populate the attribute selector and replay the stored attribute, if any.
    pub fn load(&mut self) -> Result<LoadOutcome> {
        {
            let mut page = self.page.borrow_mut();
            if let Some(url) = apply_layer(&mut page, self.store.as_mut(), &self.config)? {
                return Ok(LoadOutcome::Redirected(url));
            }
        }

        let extraction = {
            let page = self.page.borrow();
            match load_payload(&page, &self.config) {
                Ok(extraction) => extraction,
                Err(outcome) => return Ok(outcome),
            }
        };
        self.records = extraction.records.clone();

        let stored = self
            .store
            .get(&self.config.storage.generic_attribute)
            .filter(|v| !v.is_empty());
        let replay = {
            let mut page = self.page.borrow_mut();
            let key_id = &self.config.elements.key_selector;
            if let Some(keys) = page.select_mut(key_id) {
                keys.populate(extraction.attributes, Some(ATTRIBUTE_PROMPT));
            }
            stored.filter(|key| page.accept(key_id, key))
        };

        let rendered = match replay {
            Some(key) => self.emit(&key) > 0,
            None => false,
        };
        Ok(LoadOutcome::Ready { rendered })
    }

    /// Selector change: remember the attribute and notify every listener.
    /// Returns how many listeners handled the event.
    pub fn on_key_change(&mut self, value: &str) -> usize {
        let accepted = self
            .page
            .borrow_mut()
            .accept(&self.config.elements.key_selector, value);
        if !accepted {
            debug!(value, "attribute not among selector options");
            return 0;
        }

        if let Err(e) = self
            .store
            .set(&self.config.storage.generic_attribute, value)
        {
            warn!(error = %format!("{:#}", e), "could not persist selection");
        }
        self.emit(value)
    }

    fn emit(&self, key: &str) -> usize {
        let event = SelectionEvent {
            selected_key: key.to_string(),
            data: Rc::clone(&self.records),
        };
        self.dispatcher.emit(&event)
    }

    pub fn page(&self) -> Rc<RefCell<Page>> {
        Rc::clone(&self.page)
    }

    pub fn records(&self) -> &[Properties] {
        &self.records
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }
}
