use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use drip_ledger::{
    Clock, CustodyReport, InMemoryBank, LedgerConfig, LedgerError, ManualClock,
    RecordingObserver, RemainderPolicy, StartPolicy, StreamingLedger,
};
use drip_store::InMemoryStreamStore;
use drip_types::{Address, Amount, LedgerEvent, StreamId, Timestamp};

/// A scripted run against a fresh in-memory ledger.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub ledger: LedgerSection,
    /// Opening balances by party label.
    #[serde(default)]
    pub accounts: BTreeMap<String, u64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSection {
    pub identity: String,
    pub owner: String,
    pub start_policy: StartPolicy,
    pub remainder_policy: RemainderPolicy,
    /// Initial clock value.
    pub start_time: Timestamp,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            identity: "drip-ledger".into(),
            owner: "drip-owner".into(),
            start_policy: StartPolicy::default(),
            remainder_policy: RemainderPolicy::default(),
            start_time: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    /// Move the clock here before running the step.
    pub at: Option<Timestamp>,
    /// Error kind the step is expected to fail with.
    pub expect_error: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Create {
        sender: String,
        recipient: String,
        start: Timestamp,
        stop: Timestamp,
        deposit: u64,
    },
    Withdraw {
        stream: u64,
        caller: String,
    },
    Cancel {
        stream: u64,
        caller: String,
    },
    Balance {
        stream: u64,
        address: String,
    },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Withdraw { .. } => "withdraw",
            Self::Cancel { .. } => "cancel",
            Self::Balance { .. } => "balance",
        }
    }
}

impl Scenario {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("invalid scenario")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// What happened at one step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Created { id: StreamId },
    Withdrew { amount: Amount },
    Canceled { sender_share: Amount, recipient_share: Amount },
    Balance { amount: Amount },
    Failed { kind: String, message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub at: Timestamp,
    pub op: &'static str,
    pub outcome: Outcome,
    pub events: Vec<LedgerEvent>,
    pub passed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccountBalance {
    pub label: String,
    pub address: Address,
    pub balance: Amount,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub stream_count: u64,
    pub audit: CustodyReport,
    pub custody: Amount,
    pub accounts: Vec<AccountBalance>,
}

impl ScenarioReport {
    /// Steps that did not go as the scenario expected.
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.passed).count()
    }
}

type ScenarioLedger = StreamingLedger<
    InMemoryStreamStore,
    Arc<ManualClock>,
    Arc<InMemoryBank>,
    Arc<RecordingObserver>,
>;

/// Resolves party labels to addresses and remembers every label seen.
#[derive(Default)]
struct Parties {
    seen: BTreeMap<String, Address>,
}

impl Parties {
    fn resolve(&mut self, label: &str) -> Address {
        let address = label
            .parse::<Address>()
            .unwrap_or_else(|_| Address::from_label(label));
        self.seen.insert(label.to_string(), address);
        address
    }
}

/// Execute every step in order. Failing steps are recorded, not fatal.
pub fn run(scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
    let mut parties = Parties::default();
    let section = &scenario.ledger;
    let config = LedgerConfig::new(
        parties.resolve(&section.identity),
        parties.resolve(&section.owner),
    )
    .with_start_policy(section.start_policy)
    .with_remainder_policy(section.remainder_policy);

    let clock = Arc::new(ManualClock::new(section.start_time));
    let bank = Arc::new(InMemoryBank::new(config.identity));
    let observer = Arc::new(RecordingObserver::new());
    for (label, balance) in &scenario.accounts {
        bank.fund(parties.resolve(label), Amount::from(*balance));
    }

    let mut ledger: ScenarioLedger = StreamingLedger::new(
        config,
        InMemoryStreamStore::new(),
        Arc::clone(&clock),
        Arc::clone(&bank),
        Arc::clone(&observer),
    );

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        if let Some(at) = step.at {
            let now = clock.set(at);
            if now != at {
                anyhow::bail!("step {index}: clock cannot move back from {now} to {at}");
            }
        }
        debug!(index, op = step.action.name(), now = clock.now(), "running step");
        let outcome = match apply(&mut ledger, &mut parties, &step.action) {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        };
        let passed = match (&step.expect_error, &outcome) {
            (Some(expected), Outcome::Failed { kind, .. }) => expected == kind,
            (Some(_), _) => false,
            (None, Outcome::Failed { .. }) => false,
            (None, _) => true,
        };
        steps.push(StepReport {
            index,
            at: clock.now(),
            op: step.action.name(),
            outcome,
            events: observer.take(),
            passed,
        });
    }

    let audit = ledger.audit().context("auditing ledger")?;
    let accounts = parties
        .seen
        .iter()
        .map(|(label, address)| AccountBalance {
            label: label.clone(),
            address: *address,
            balance: bank.balance(address),
        })
        .collect();

    Ok(ScenarioReport {
        steps,
        stream_count: ledger.stream_count(),
        audit,
        custody: bank.custody_balance(),
        accounts,
    })
}

fn apply(
    ledger: &mut ScenarioLedger,
    parties: &mut Parties,
    action: &Action,
) -> Result<Outcome, LedgerError> {
    match action {
        Action::Create {
            sender,
            recipient,
            start,
            stop,
            deposit,
        } => {
            let sender = parties.resolve(sender);
            let recipient = parties.resolve(recipient);
            let id =
                ledger.create_stream(&sender, &recipient, *start, *stop, Amount::from(*deposit))?;
            Ok(Outcome::Created { id })
        }
        Action::Withdraw { stream, caller } => {
            let caller = parties.resolve(caller);
            let amount = ledger.withdraw_from_stream(StreamId(*stream), &caller)?;
            Ok(Outcome::Withdrew { amount })
        }
        Action::Cancel { stream, caller } => {
            let caller = parties.resolve(caller);
            let split = ledger.cancel_stream(StreamId(*stream), &caller)?;
            Ok(Outcome::Canceled {
                sender_share: split.sender_share,
                recipient_share: split.recipient_share,
            })
        }
        Action::Balance { stream, address } => {
            let address = parties.resolve(address);
            let amount = ledger.balance_of(StreamId(*stream), &address)?;
            Ok(Outcome::Balance { amount })
        }
    }
}
