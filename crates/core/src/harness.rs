//! The harness entry point
//!
//! [`Harness::run_test`] brings the orchestrated application up, waits for it
//! to be ready, runs a test body against it, and tears everything down again.
//! Expensive one-time steps (build, address resolution, log open, pull) run
//! on the first call only and are reused by every later call on the same
//! harness.
//!
//! Runs on one harness are serialized: the lifecycle state is locked for the
//! whole run, so tests sharing a harness may run on parallel test threads.
//!
//! ```no_run
//! use std::sync::OnceLock;
//! use stevedore_core::harness::Harness;
//!
//! fn harness() -> &'static Harness {
//!     static HARNESS: OnceLock<Harness> = OnceLock::new();
//!     HARNESS.get_or_init(|| {
//!         let mut harness = Harness::from_env().expect("harness configuration");
//!         harness.register_per_run(|address| {
//!             println!("seeding fixtures on {}", address);
//!             Ok(())
//!         });
//!         harness
//!     })
//! }
//!
//! // Called from a `#[tokio::test]`
//! async fn serves_index() {
//!     harness()
//!         .run_test(|address| async move {
//!             assert!(!address.as_str().is_empty());
//!         })
//!         .await
//!         .expect("harness run");
//! }
//! ```

use crate::address::{resolve_target_address, TargetAddress};
use crate::cleanup::{Cleanup, CleanupStack};
use crate::compose::{ComposeBackend, ComposeCli};
use crate::config::HarnessConfig;
use crate::errors::{Result, SetupError};
use crate::hooks::HookRegistry;
use crate::log_sink::LogSink;
use crate::readiness::{wait_until_ready, HttpProbe, ReadinessProbe};
use crate::state::LifecycleState;
use crate::supervisor::SupervisedProcess;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Test-harness lifecycle manager for one orchestrated application
pub struct Harness<B = ComposeCli, P = HttpProbe> {
    config: HarnessConfig,
    backend: B,
    probe: P,
    hooks: HookRegistry,
    state: Mutex<LifecycleState>,
}

impl Harness {
    /// Harness driving the real orchestrator CLI with an HTTP probe
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let backend = ComposeCli::from_config(&config);
        let probe = HttpProbe::new(config.probe_timeout(), config.ready_status)?;
        Ok(Self::with_parts(config, backend, probe))
    }

    /// Harness configured from `stevedore.toml` and the environment
    pub fn from_env() -> Result<Self> {
        Self::new(HarnessConfig::load(None)?)
    }
}

impl<B, P> Harness<B, P>
where
    B: ComposeBackend,
    P: ReadinessProbe,
{
    /// Harness with an explicit backend and probe
    pub fn with_parts(config: HarnessConfig, backend: B, probe: P) -> Self {
        Self {
            config,
            backend,
            probe,
            hooks: HookRegistry::new(),
            state: Mutex::new(LifecycleState::new()),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register a hook to run once, before the first run
    pub fn register_global<F>(&mut self, hook: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.register_global(hook);
    }

    /// Register a hook to run before every test body
    pub fn register_per_run<F>(&mut self, hook: F)
    where
        F: Fn(&TargetAddress) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.register_per_run(hook);
    }

    /// Number of runs started so far
    pub async fn sequence(&self) -> u64 {
        self.state.lock().await.sequence
    }

    /// The resolved address, once a run has resolved it
    pub async fn target_address(&self) -> Option<TargetAddress> {
        self.state.lock().await.target_address.clone()
    }

    /// Resolve (and cache) the target address without starting anything
    pub async fn resolve_address(&self) -> Result<TargetAddress> {
        let mut state = self.state.lock().await;
        self.ensure_address(&mut state).await
    }

    /// Run `body` against a live, ready instance of the application
    ///
    /// Returns `Ok(None)` without doing anything in short mode. Scheduled
    /// cleanups run on every exit path; a panic in `body` resumes after they
    /// have finished. A shutdown failure fails the run even when `body`
    /// succeeded.
    #[instrument(skip_all)]
    pub async fn run_test<F, Fut, T>(&self, body: F) -> Result<Option<T>>
    where
        F: FnOnce(TargetAddress) -> Fut,
        Fut: Future<Output = T>,
    {
        if self.config.short {
            info!("skipping Compose end-to-end test in short mode");
            return Ok(None);
        }

        let mut state = self.state.lock().await;
        let mut cleanups = CleanupStack::new();

        let outcome = AssertUnwindSafe(self.run_scoped(&mut state, &mut cleanups, body))
            .catch_unwind()
            .await;
        let mut cleanup_errors = cleanups.unwind(&self.backend).await.into_iter();

        match outcome {
            Ok(Ok(value)) => match cleanup_errors.next() {
                Some(first) => {
                    for later in cleanup_errors {
                        error!("Additional cleanup failure: {}", later);
                    }
                    Err(first)
                }
                None => Ok(Some(value)),
            },
            Ok(Err(e)) => {
                for later in cleanup_errors {
                    error!("Cleanup failure after run error: {}", later);
                }
                Err(e)
            }
            Err(panic) => {
                for later in cleanup_errors {
                    error!("Cleanup failure after panic: {}", later);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn run_scoped<F, Fut, T>(
        &self,
        state: &mut LifecycleState,
        cleanups: &mut CleanupStack<B::Process>,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(TargetAddress) -> Fut,
        Fut: Future<Output = T>,
    {
        if !state.hooks_ran {
            self.hooks.run_global()?;
            state.hooks_ran = true;
        }

        let (address, sink) = self.initialize(state).await?;
        cleanups.push(Cleanup::SyncLog { sink: sink.clone() });

        let process = SupervisedProcess::start(&self.backend, &sink).await?;
        cleanups.push(Cleanup::Shutdown {
            process,
            timeout: self.config.shutdown_timeout(),
        });

        let sequence = state.next_sequence();
        sink.start_marker(sequence)?;
        cleanups.push(Cleanup::EndMarker {
            sink: sink.clone(),
            sequence,
            delay: self.config.end_marker_delay(),
        });
        info!("Starting test {}", sequence);

        self.hooks.run_per_run(&address)?;

        let url = address.http_url(self.config.port, &self.config.health_path);
        wait_until_ready(
            &self.probe,
            &url,
            self.config.poll_interval(),
            self.config.readiness_timeout(),
        )
        .await?;

        Ok(body(address).await)
    }

    /// One-time steps: build, address, log sink, pull
    async fn initialize(&self, state: &mut LifecycleState) -> Result<(TargetAddress, LogSink)> {
        if !state.built {
            let output = self.backend.build().await.map_err(|e| SetupError::Build {
                message: e.to_string(),
            })?;
            if !output.success() {
                return Err(SetupError::Build {
                    message: output.describe(),
                }
                .into());
            }
            state.built = true;
            info!("Build step complete");
        }

        let address = self.ensure_address(state).await?;

        let sink = match &state.log_sink {
            Some(sink) => sink.clone(),
            None => {
                let sink = LogSink::create(&self.config.log_file)?;
                state.log_sink = Some(sink.clone());
                sink
            }
        };

        if !state.pulled {
            sink.write_str("pulling Compose images...")?;
            let output = self.backend.pull().await.map_err(|e| SetupError::Pull {
                message: e.to_string(),
            })?;
            if !output.success() {
                sink.write_raw(&output.output)?;
                return Err(SetupError::Pull {
                    message: output.status.to_string(),
                }
                .into());
            }
            state.pulled = true;
            sink.write_str("done\n")?;
            info!("Compose images pulled");
        }

        Ok((address, sink))
    }

    async fn ensure_address(&self, state: &mut LifecycleState) -> Result<TargetAddress> {
        if let Some(address) = &state.target_address {
            return Ok(address.clone());
        }
        let address =
            resolve_target_address(&self.backend, self.config.target_address.as_deref()).await?;
        state.target_address = Some(address.clone());
        Ok(address)
    }
}

impl<B, P> std::fmt::Debug for Harness<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
