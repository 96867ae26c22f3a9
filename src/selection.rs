// Copyright (c) 2024 texer.ai Ltd.

//! The oracle & selector boundary (§4.9): trait seams for the
//! signal-classification oracle and the two interactive selectors named as
//! out-of-core-scope external collaborators in §1, plus the concrete
//! non-interactive implementations the core ships for scriptable use.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::error::Result;
use crate::model::{ControlSignals, Edge, GateType, HierarchyMap, InstancePath, SelectedSignal};

/// The outcome of an external selector call: either a choice, or a
/// cooperative request to terminate the session (§5).
#[derive(Debug, Clone)]
pub enum SelectorOutcome<T> {
    /// The selector made a choice.
    Chosen(T),
    /// The user (or an automated caller) asked to abort the session.
    Terminate,
}

/// One module the classification oracle is asked to look at: enough
/// context to name fuzz candidates and control signals without this crate
/// depending on a concrete transport to reach the oracle.
pub struct ModuleNode<'a> {
    pub instance_path: &'a str,
    pub module_name: &'a str,
    pub signal_width_data: &'a IndexMap<String, u32>,
}

/// One signal the oracle judges safe to fuzz.
#[derive(Debug, Clone)]
pub struct FuzzCandidate {
    pub name: String,
    pub certainty: u8,
    pub gate_type: GateType,
}

/// The oracle's verdict on one module (§4.9, §1).
#[derive(Debug, Clone)]
pub struct OracleVerdict {
    pub fuzz_candidates: Vec<FuzzCandidate>,
    pub control_signals: ControlSignals,
}

/// A fuzz candidate annotated with everything the signal selector needs
/// to decide and the session needs to build a [`SelectedSignal`].
#[derive(Debug, Clone)]
pub struct ClassifiedSignal {
    pub hierarchy: InstancePath,
    pub name: String,
    pub module_name: String,
    pub declaration_path: std::path::PathBuf,
    pub width: u32,
    pub certainty: u8,
    pub gate_type: GateType,
    pub control_signals: ControlSignals,
}

/// The signal-classification oracle (§1, §4.9): a pure function from a
/// module's context to fuzz candidates and control signals. The reference
/// implementation reaches a remote LLM; the core only depends on this trait.
pub trait SignalOracle {
    fn classify(&self, module: &ModuleNode) -> Result<OracleVerdict>;
}

/// The module-picker interactive selector (§1, §4.9).
pub trait ModuleSelector {
    fn select(&self, hierarchy: &HierarchyMap) -> Result<SelectorOutcome<Vec<InstancePath>>>;
}

/// The signal-picker interactive selector (§1, §4.9).
pub trait SignalSelector {
    fn select(&self, candidates: &[ClassifiedSignal]) -> Result<SelectorOutcome<Vec<SelectedSignal>>>;
}

/// A non-interactive [`SignalOracle`] standing in for the reference LLM:
/// candidates are every signal name in `signal_width_data` matching an
/// optional caller-supplied allow-list, all at full certainty (§4.11
/// `--oracle-allow`).
///
/// Clock/reset are guessed from signal names containing `clk`/`clock` and
/// `rst`/`reset` (case-insensitively); absent a match, `clk`/`rst_n` are
/// assumed. This is deliberately crude: production deployments replace this
/// whole trait implementation with a real oracle.
pub struct ThresholdSignalOracle {
    pub allow: Option<Vec<String>>,
    pub gate_type: GateType,
}

impl ThresholdSignalOracle {
    pub fn new(allow: Option<Vec<String>>) -> Self {
        ThresholdSignalOracle {
            allow,
            gate_type: GateType::And,
        }
    }

    fn guess_control_signals(signal_width_data: &IndexMap<String, u32>) -> ControlSignals {
        let clock = signal_width_data
            .keys()
            .find(|name| {
                let lower = name.to_lowercase();
                lower.contains("clk") || lower.contains("clock")
            })
            .cloned()
            .unwrap_or_else(|| "clk".to_string());
        let reset = signal_width_data
            .keys()
            .find(|name| {
                let lower = name.to_lowercase();
                lower.contains("rst") || lower.contains("reset")
            })
            .cloned()
            .unwrap_or_else(|| "rst_n".to_string());
        ControlSignals {
            clock,
            reset,
            edge: Edge::Posedge,
        }
    }
}

impl SignalOracle for ThresholdSignalOracle {
    fn classify(&self, module: &ModuleNode) -> Result<OracleVerdict> {
        let fuzz_candidates = module
            .signal_width_data
            .keys()
            .filter(|name| {
                self.allow
                    .as_ref()
                    .map(|allow| allow.iter().any(|a| a == *name))
                    .unwrap_or(true)
            })
            .map(|name| FuzzCandidate {
                name: name.clone(),
                certainty: 100,
                gate_type: self.gate_type,
            })
            .collect();

        Ok(OracleVerdict {
            fuzz_candidates,
            control_signals: Self::guess_control_signals(module.signal_width_data),
        })
    }
}

/// A [`ModuleSelector`]/[`SignalSelector`] pair that accepts every offered
/// choice, for scriptable runs and tests.
pub struct SelectAll;

impl ModuleSelector for SelectAll {
    fn select(&self, hierarchy: &HierarchyMap) -> Result<SelectorOutcome<Vec<InstancePath>>> {
        Ok(SelectorOutcome::Chosen(hierarchy.keys().cloned().collect()))
    }
}

impl SignalSelector for SelectAll {
    fn select(&self, candidates: &[ClassifiedSignal]) -> Result<SelectorOutcome<Vec<SelectedSignal>>> {
        Ok(SelectorOutcome::Chosen(
            candidates.iter().cloned().map(to_selected_signal).collect(),
        ))
    }
}

/// A [`SignalSelector`] that keeps only candidates at or above a certainty
/// threshold (§4.11 `--certainty-threshold`).
pub struct CertaintyThreshold {
    pub threshold: u8,
}

impl SignalSelector for CertaintyThreshold {
    fn select(&self, candidates: &[ClassifiedSignal]) -> Result<SelectorOutcome<Vec<SelectedSignal>>> {
        Ok(SelectorOutcome::Chosen(
            candidates
                .iter()
                .filter(|c| c.certainty >= self.threshold)
                .cloned()
                .map(to_selected_signal)
                .collect(),
        ))
    }
}

fn to_selected_signal(c: ClassifiedSignal) -> SelectedSignal {
    SelectedSignal {
        hierarchy: c.hierarchy,
        name: c.name,
        module_name: c.module_name,
        declaration_path: c.declaration_path,
        width: c.width,
        certainty: c.certainty,
        parent_module_control_signals: c.control_signals,
        gate_type: c.gate_type,
        punch_name: None,
    }
}

/// Rate-limits calls into the classification oracle (§5): a plain struct
/// tracking a cumulative token count and the last request's time, sleeping
/// synchronously when the budget would be exceeded rather than yielding to
/// an async executor — this crate has none.
pub struct TokenBudgetThrottle {
    tokens_per_interval: u64,
    interval: Duration,
    cumulative_tokens: u64,
    last_request: Option<Instant>,
}

impl TokenBudgetThrottle {
    pub fn new(tokens_per_interval: u64, interval: Duration) -> Self {
        TokenBudgetThrottle {
            tokens_per_interval,
            interval,
            cumulative_tokens: 0,
            last_request: None,
        }
    }

    /// Record a request costing `tokens`, blocking first if the cumulative
    /// count would exceed `tokens_per_interval` within `interval` of the
    /// last request.
    pub fn record(&mut self, tokens: u64) {
        if self.cumulative_tokens + tokens > self.tokens_per_interval {
            if let Some(last) = self.last_request {
                let elapsed = last.elapsed();
                if elapsed < self.interval {
                    std::thread::sleep(self.interval - elapsed);
                }
            }
            self.cumulative_tokens = 0;
        }
        self.cumulative_tokens += tokens;
        self.last_request = Some(Instant::now());
    }
}
