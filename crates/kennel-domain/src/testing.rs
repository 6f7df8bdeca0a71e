//! In-memory doubles for the hypervisor and the host filesystem.
//!
//! Every double records the calls made against it so tests can assert on
//! ordering and counts after the values have been moved into the code under
//! test. Enabled for this crate's own tests and through the `testing` feature.

use crate::document::Element;
use crate::error::{DomainError, Result};
use crate::fs::HostFs;
use crate::hypervisor::{Connector, Domain, Hypervisor, Network};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered record of every call made against the doubles.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }

    /// All calls so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of calls equal to `call`.
    pub fn count(&self, call: &str) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    /// Position of the first call equal to `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        lock(&self.calls).iter().position(|c| c == call)
    }
}

/// Behaviour and call counters of a [`FakeDomain`].
#[derive(Debug, Default)]
pub struct DomainState {
    pub active: AtomicBool,
    pub fail_is_active: AtomicBool,
    pub fail_destroy: AtomicBool,
    pub fail_undefine: AtomicBool,
    pub destroy_calls: AtomicUsize,
    pub undefine_calls: AtomicUsize,
}

impl DomainState {
    pub fn active() -> Arc<Self> {
        let state = Self::default();
        state.active.store(true, Ordering::SeqCst);
        Arc::new(state)
    }

    pub fn inactive() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn undefine_calls(&self) -> usize {
        self.undefine_calls.load(Ordering::SeqCst)
    }
}

/// Domain double.
#[derive(Debug, Clone)]
pub struct FakeDomain {
    name: String,
    xml: String,
    state: Arc<DomainState>,
    log: Arc<CallLog>,
}

impl FakeDomain {
    pub fn new(name: &str, xml: &str, state: Arc<DomainState>) -> Self {
        Self {
            name: name.to_string(),
            xml: xml.to_string(),
            state,
            log: Arc::default(),
        }
    }

    pub fn state(&self) -> &Arc<DomainState> {
        &self.state
    }

    pub fn log(&self) -> &Arc<CallLog> {
        &self.log
    }
}

#[async_trait]
impl Domain for FakeDomain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_active(&self) -> Result<bool> {
        self.log.record("domain.is_active");
        if self.state.fail_is_active.load(Ordering::SeqCst) {
            return Err(DomainError::Operational("is_active: BOOM".into()));
        }
        Ok(self.state.active.load(Ordering::SeqCst))
    }

    async fn destroy(&self) -> Result<()> {
        self.log.record("domain.destroy");
        self.state.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_destroy.load(Ordering::SeqCst) {
            return Err(DomainError::Operational("destroy: BOOM".into()));
        }
        self.state.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn undefine(&self) -> Result<()> {
        self.log.record("domain.undefine");
        self.state.undefine_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_undefine.load(Ordering::SeqCst) {
            return Err(DomainError::Operational("undefine: BOOM".into()));
        }
        Ok(())
    }

    async fn xml_desc(&self) -> Result<String> {
        Ok(self.xml.clone())
    }
}

/// Network double.
#[derive(Debug, Clone)]
pub struct FakeNetwork {
    name: String,
    xml: String,
    log: Arc<CallLog>,
}

impl FakeNetwork {
    pub fn xml(&self) -> &str {
        &self.xml
    }
}

#[async_trait]
impl Network for FakeNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    async fn xml_desc(&self) -> Result<String> {
        Ok(self.xml.clone())
    }

    async fn destroy(&self) -> Result<()> {
        self.log.record(format!("network.destroy:{}", self.name));
        Ok(())
    }
}

/// Hypervisor double.
///
/// Networks registered with [`FakeHypervisor::with_network`] are visible to
/// `list_networks` and `lookup_network`. Defined domains share the
/// [`DomainState`] handed to [`FakeHypervisor::with_domain_state`].
#[derive(Debug, Clone)]
pub struct FakeHypervisor {
    uri: String,
    log: Arc<CallLog>,
    networks: Arc<Mutex<BTreeMap<String, String>>>,
    defined: Arc<Mutex<Vec<String>>>,
    created_networks: Arc<Mutex<Vec<String>>>,
    domain_state: Arc<DomainState>,
    fail_define: Arc<AtomicBool>,
    network_create_failures: Arc<AtomicUsize>,
}

impl Default for FakeHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self {
            uri: String::new(),
            log: Arc::default(),
            networks: Arc::default(),
            defined: Arc::default(),
            created_networks: Arc::default(),
            domain_state: DomainState::inactive(),
            fail_define: Arc::default(),
            network_create_failures: Arc::default(),
        }
    }

    /// Register an existing network.
    pub fn with_network(self, name: &str, xml: &str) -> Self {
        lock(&self.networks).insert(name.to_string(), xml.to_string());
        self
    }

    pub fn with_domain_state(mut self, state: Arc<DomainState>) -> Self {
        self.domain_state = state;
        self
    }

    /// Make every `define_domain` call fail.
    pub fn failing_define(self) -> Self {
        self.fail_define.store(true, Ordering::SeqCst);
        self
    }

    /// Make the next `count` `create_network` calls fail.
    pub fn failing_network_creates(self, count: usize) -> Self {
        self.network_create_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn log(&self) -> &Arc<CallLog> {
        &self.log
    }

    /// Documents passed to `define_domain`, in order.
    pub fn defined(&self) -> Vec<String> {
        lock(&self.defined).clone()
    }

    /// Documents passed to `create_network`, including failed attempts.
    pub fn created_networks(&self) -> Vec<String> {
        lock(&self.created_networks).clone()
    }

    pub fn close_calls(&self) -> usize {
        self.log.count("hypervisor.close")
    }

    fn network(&self, name: &str, xml: &str) -> FakeNetwork {
        FakeNetwork {
            name: name.to_string(),
            xml: xml.to_string(),
            log: Arc::clone(&self.log),
        }
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    type Domain = FakeDomain;
    type Network = FakeNetwork;

    fn uri(&self) -> &str {
        &self.uri
    }

    async fn define_domain(&self, xml: &str) -> Result<FakeDomain> {
        self.log.record("hypervisor.define_domain");
        lock(&self.defined).push(xml.to_string());
        if self.fail_define.load(Ordering::SeqCst) {
            return Err(DomainError::Operational("define: BOOM".into()));
        }
        let root = Element::parse(xml)?;
        let name = root.find("name").map(Element::text).unwrap_or_default();
        Ok(FakeDomain {
            name,
            xml: xml.to_string(),
            state: Arc::clone(&self.domain_state),
            log: Arc::clone(&self.log),
        })
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        Ok(lock(&self.networks).keys().cloned().collect())
    }

    async fn lookup_network(&self, name: &str) -> Result<FakeNetwork> {
        self.log.record(format!("hypervisor.lookup_network:{name}"));
        let xml = lock(&self.networks).get(name).cloned();
        match xml {
            Some(xml) => Ok(self.network(name, &xml)),
            None => Err(DomainError::Operational(format!(
                "network not found: {name}"
            ))),
        }
    }

    async fn create_network(&self, xml: &str) -> Result<FakeNetwork> {
        self.log.record("hypervisor.create_network");
        lock(&self.created_networks).push(xml.to_string());
        let remaining = self.network_create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.network_create_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(DomainError::Operational("network create: BOOM".into()));
        }
        let root = Element::parse(xml)?;
        let name = root.find("name").map(Element::text).unwrap_or_default();
        lock(&self.networks).insert(name.clone(), xml.to_string());
        Ok(self.network(&name, xml))
    }

    async fn close(&self) -> Result<()> {
        self.log.record("hypervisor.close");
        Ok(())
    }
}

/// Connector double handing out clones of one [`FakeHypervisor`].
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    hypervisor: FakeHypervisor,
    opened: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new(hypervisor: FakeHypervisor) -> Self {
        Self {
            hypervisor,
            opened: Arc::default(),
        }
    }

    /// Locators passed to `open`, in order.
    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }

    pub fn hypervisor(&self) -> &FakeHypervisor {
        &self.hypervisor
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Hypervisor = FakeHypervisor;

    async fn open(&self, uri: &str) -> Result<FakeHypervisor> {
        lock(&self.opened).push(uri.to_string());
        let mut hypervisor = self.hypervisor.clone();
        hypervisor.uri = uri.to_string();
        Ok(hypervisor)
    }
}

#[derive(Debug, Default)]
struct MemoryFsState {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
    created: Vec<PathBuf>,
    removed: Vec<PathBuf>,
    fail_remove: bool,
}

/// [`HostFs`] double holding files and directories in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<MemoryFsState>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        lock(&self.state)
            .files
            .insert(path.into(), contents.to_string());
        self
    }

    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        lock(&self.state).dirs.insert(path.into());
        self
    }

    /// Make `remove_dir_all` fail with a permission error.
    pub fn failing_remove(self) -> Self {
        lock(&self.state).fail_remove = true;
        self
    }

    /// Paths passed to `create_dir_all`, in order.
    pub fn created(&self) -> Vec<PathBuf> {
        lock(&self.state).created.clone()
    }

    /// Paths passed to `remove_dir_all`, in order.
    pub fn removed(&self) -> Vec<PathBuf> {
        lock(&self.state).removed.clone()
    }
}

#[async_trait]
impl HostFs for MemoryFs {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        lock(&self.state)
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.created.push(path.to_path_buf());
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        let state = lock(&self.state);
        state.dirs.contains(path) || state.files.contains_key(path)
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.removed.push(path.to_path_buf());
        if state.fail_remove {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "BOOM"));
        }
        if !state.dirs.remove(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, path.display().to_string()));
        }
        Ok(())
    }
}
