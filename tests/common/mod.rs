//! A scripted, in-memory [`Page`] for driving the capture pipeline
//! without a browser.
//!
//! A [`SimPage`] is a list of phases, each describing the queryable
//! page at one moment. A successful click, or navigating to a mapped
//! URL, moves to the next phase; that is how the fake models the page
//! reacting to the driver. Pauses and settles return immediately since
//! the phase list is the fake's only clock.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use magpie::browser::{ElementHandle, Page};

/// How one click strategy behaves on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    Works,
    Fails,
    /// Never resolves within the caller's click budget.
    Hangs,
}

#[derive(Debug, Clone)]
pub struct SimElement {
    pub handle: u64,
    pub matches: Vec<&'static str>,
    pub visible: bool,
    pub text: &'static str,
    pub pointer: Click,
    pub scripted: Click,
    pub synthetic: Click,
}

impl SimElement {
    pub fn new(handle: u64, matches: &[&'static str]) -> Self {
        Self {
            handle,
            matches: matches.to_vec(),
            visible: true,
            text: "",
            pointer: Click::Works,
            scripted: Click::Works,
            synthetic: Click::Works,
        }
    }

    pub fn text(mut self, text: &'static str) -> Self {
        self.text = text;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn pointer(mut self, click: Click) -> Self {
        self.pointer = click;
        self
    }

    pub fn scripted(mut self, click: Click) -> Self {
        self.scripted = click;
        self
    }

    pub fn synthetic(mut self, click: Click) -> Self {
        self.synthetic = click;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimPhase {
    pub url: String,
    pub document: String,
    pub elements: Vec<SimElement>,
}

impl SimPhase {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn document(mut self, document: &str) -> Self {
        self.document = document.to_string();
        self
    }

    pub fn element(mut self, element: SimElement) -> Self {
        self.elements.push(element);
        self
    }
}

#[derive(Debug, Default)]
struct SimState {
    phase: usize,
    filled: HashMap<u64, String>,
    calls: Vec<String>,
}

pub struct SimPage {
    phases: Vec<SimPhase>,
    nav_targets: HashMap<String, usize>,
    state: Mutex<SimState>,
}

impl SimPage {
    pub fn new(phases: Vec<SimPhase>) -> Self {
        assert!(!phases.is_empty(), "a SimPage needs at least one phase");
        Self {
            phases,
            nav_targets: HashMap::new(),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Make `navigate(url)` jump to the given phase.
    pub fn map_navigation(mut self, url: &str, phase: usize) -> Self {
        self.nav_targets.insert(url.to_string(), phase);
        self
    }

    /// Every logged interaction, in order, as `method:argument`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Click attempts only, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                call.starts_with("pointer:")
                    || call.starts_with("scripted:")
                    || call.starts_with("synthetic:")
            })
            .collect()
    }

    pub fn filled(&self, handle: u64) -> Option<String> {
        self.state.lock().unwrap().filled.get(&handle).cloned()
    }

    fn log(&self, entry: String) {
        self.state.lock().unwrap().calls.push(entry);
    }

    fn current_phase(&self) -> &SimPhase {
        let index = self.state.lock().unwrap().phase;
        &self.phases[index.min(self.phases.len() - 1)]
    }

    fn find(&self, element: ElementHandle) -> Option<SimElement> {
        self.current_phase()
            .elements
            .iter()
            .find(|candidate| candidate.handle == element.0)
            .cloned()
    }

    fn advance(&self) {
        let mut state = self.state.lock().unwrap();
        state.phase = (state.phase + 1).min(self.phases.len() - 1);
    }

    async fn attempt(&self, kind: &'static str, element: ElementHandle) -> Result<()> {
        self.log(format!("{kind}:{}", element.0));
        let Some(found) = self.find(element) else {
            bail!("stale element handle {}", element.0);
        };
        let behavior = match kind {
            "pointer" => found.pointer,
            "scripted" => found.scripted,
            _ => found.synthetic,
        };
        match behavior {
            Click::Works => {
                self.advance();
                Ok(())
            }
            Click::Fails => bail!("{kind} click rejected"),
            Click::Hangs => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                bail!("hung click was not cancelled")
            }
        }
    }
}

#[async_trait]
impl Page for SimPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.log(format!("navigate:{url}"));
        if let Some(&phase) = self.nav_targets.get(url) {
            self.state.lock().unwrap().phase = phase;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current_phase().url.clone())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        Ok(self
            .current_phase()
            .elements
            .iter()
            .filter(|element| element.matches.iter().any(|matched| *matched == selector))
            .map(|element| ElementHandle(element.handle))
            .collect())
    }

    async fn is_visible(&self, element: ElementHandle) -> Result<bool> {
        Ok(self.find(element).map(|found| found.visible).unwrap_or(false))
    }

    async fn text(&self, element: ElementHandle) -> Result<String> {
        match self.find(element) {
            Some(found) => Ok(found.text.to_string()),
            None => bail!("stale element handle {}", element.0),
        }
    }

    async fn inner_html(&self, element: ElementHandle) -> Result<String> {
        self.text(element).await
    }

    async fn scroll_into_view(&self, _element: ElementHandle) -> Result<()> {
        Ok(())
    }

    async fn click(&self, element: ElementHandle) -> Result<()> {
        self.attempt("pointer", element).await
    }

    async fn click_scripted(&self, element: ElementHandle) -> Result<()> {
        self.attempt("scripted", element).await
    }

    async fn dispatch_click(&self, element: ElementHandle) -> Result<()> {
        self.attempt("synthetic", element).await
    }

    async fn fill(&self, element: ElementHandle, value: &str) -> Result<()> {
        self.log(format!("fill:{}", element.0));
        if self.find(element).is_none() {
            bail!("stale element handle {}", element.0);
        }
        self.state
            .lock()
            .unwrap()
            .filled
            .insert(element.0, value.to_string());
        Ok(())
    }

    async fn eval_on(&self, element: ElementHandle, _function: &str) -> Result<Value> {
        if let Some(value) = self.filled(element.0) {
            return Ok(Value::String(value));
        }
        Ok(Value::Bool(true))
    }

    async fn eval(&self, _script: &str) -> Result<Value> {
        Ok(Value::Bool(true))
    }

    async fn settle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn pause(&self, _delay: Duration) {}

    async fn snapshot(&self) -> Result<String> {
        Ok(self.current_phase().document.clone())
    }
}
