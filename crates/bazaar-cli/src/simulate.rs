//! # Simulate Subcommand
//!
//! Replays a scripted scenario against an in-memory engine driven by a
//! manual clock, then prints the step outcomes, the event log and the final
//! balances of every party as JSON.
//!
//! ## Scenario format
//!
//! ```yaml
//! start: 1700000000
//! pauser: operator
//! parties:
//!   buyer: "0x1111111111111111111111111111111111111111111111111111111111111111"
//!   seller: "0x2222222222222222222222222222222222222222222222222222222222222222"
//!   operator: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
//! funding:
//!   - { party: buyer, amount: 1000 }
//! offers:
//!   - { id: 1, seller: seller, price: 100, seller_deposit: 20,
//!       voucher_valid_duration: 500, dispute_period: 100, resolution_period: 200 }
//! steps:
//!   - caller: seller
//!     action: { call: { deposit_funds: { owner: "@seller", asset: native, amount: 100 } } }
//!   - caller: buyer
//!     action: { call: { commit: { offer_id: 1 } } }
//!   - caller: buyer
//!     advance: 600
//!     action: { call: { redeem_voucher: { exchange_id: 1 } } }
//!     expect_error: invalid_state
//! ```
//!
//! A party is either a 32-byte secret key (it can sign) or a bare 20-byte
//! address. Any string `"@name"` elsewhere in the document is replaced by
//! that party's address, and the string `native` by the native asset.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use bazaar_core::{Address, AssetId, BasisPoints, ExchangeId, ManualClock, OfferId, PausableRegion, Timestamp};
use bazaar_crypto::{LocalSigner, ResolutionMessage};
use bazaar_settlement::{
    CallOutput, DisputeResolver, DisputeResolverFee, EngineCall, ErrorKind, EventEnvelope,
    InMemoryRegistry, InMemoryTokenBank, MetaTransaction, Offer, SettlementConfig, SettlementEngine,
    SettlementError,
};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Arguments for `bazaar simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario file.
    pub scenario: PathBuf,

    /// Write the report here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Offers stay open this long unless the scenario says otherwise.
const DEFAULT_OFFER_WINDOW: u64 = 30 * 24 * 60 * 60;

fn default_start() -> i64 {
    1_700_000_000
}

fn native() -> String {
    "native".to_string()
}

fn one() -> u64 {
    1
}

fn default_offer_window() -> u64 {
    DEFAULT_OFFER_WINDOW
}

fn active() -> bool {
    true
}

/// A complete scenario document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Unix seconds the clock starts at.
    #[serde(default = "default_start")]
    pub start: i64,
    /// Engine configuration.
    #[serde(default)]
    pub config: SettlementConfig,
    /// Party that becomes the configured pauser.
    #[serde(default)]
    pub pauser: Option<String>,
    /// Named keys and addresses.
    pub parties: BTreeMap<String, String>,
    /// Registered dispute resolvers.
    #[serde(default)]
    pub resolvers: Vec<ResolverSpec>,
    /// Registered offers.
    #[serde(default)]
    pub offers: Vec<OfferSpec>,
    /// Wallet balances minted before the first step.
    #[serde(default)]
    pub funding: Vec<FundingSpec>,
    /// Calls to replay, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A dispute resolver owned by a party.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverSpec {
    pub party: String,
    pub escalation_response_period: u64,
    #[serde(default)]
    pub fees: Vec<FeeSpec>,
    #[serde(default = "active")]
    pub active: bool,
}

/// One resolver fee.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeSpec {
    #[serde(default = "native")]
    pub asset: String,
    pub amount: u128,
}

/// An offer, with times relative to the scenario start.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfferSpec {
    pub id: u64,
    pub seller: String,
    pub price: u128,
    #[serde(default)]
    pub seller_deposit: u128,
    #[serde(default)]
    pub buyer_cancel_penalty: u128,
    #[serde(default = "native")]
    pub asset: String,
    #[serde(default = "one")]
    pub quantity: u64,
    #[serde(default)]
    pub resolver: Option<String>,
    /// Seconds after start before vouchers become redeemable.
    #[serde(default)]
    pub redeemable_after: u64,
    /// Seconds after start the offer accepts commits.
    #[serde(default = "default_offer_window")]
    pub open_for: u64,
    pub voucher_valid_duration: u64,
    pub dispute_period: u64,
    pub resolution_period: u64,
}

/// Wallet funding.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FundingSpec {
    pub party: String,
    #[serde(default = "native")]
    pub asset: String,
    pub amount: u128,
}

/// One scripted call.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Seconds to move the clock forward before the call.
    #[serde(default)]
    pub advance: u64,
    /// Party making the call.
    pub caller: String,
    /// What the caller does.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub action: Action,
    /// The error kind the call must fail with, if any.
    #[serde(default)]
    pub expect_error: Option<ErrorKind>,
}

/// What a step does.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Any engine operation, as-is.
    Call(EngineCall),
    /// `resolve_dispute` with a signature produced by `signed_by`.
    Resolve {
        exchange_id: ExchangeId,
        buyer_percent: u32,
        signed_by: String,
    },
    /// Relay `call` signed by `signer`; the step's caller is the relayer.
    Relay {
        signer: String,
        nonce: u64,
        call: EngineCall,
    },
    /// Pause regions; empty means all.
    Pause(Vec<PausableRegion>),
    /// Unpause regions; empty means all.
    Unpause(Vec<PausableRegion>),
}

/// What happened at one step.
#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub caller: String,
    pub function: String,
    pub at: Timestamp,
    pub output: Option<CallOutput>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Whether the result matched `expect_error`.
    pub as_expected: bool,
}

/// A party's final position in one asset.
#[derive(Debug, Serialize)]
pub struct BalanceLine {
    pub party: String,
    pub address: Address,
    pub asset: AssetId,
    pub available: u128,
    pub wallet: u128,
}

/// Full simulation output.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepOutcome>,
    pub events: Vec<EventEnvelope>,
    pub balances: Vec<BalanceLine>,
}

impl SimulationReport {
    /// Whether every step behaved as the scenario expected.
    pub fn all_as_expected(&self) -> bool {
        self.steps.iter().all(|step| step.as_expected)
    }
}

// ── Parties ─────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Party {
    Key(LocalSigner),
    Watch(Address),
}

impl Party {
    fn parse(name: &str, raw: &str) -> Result<Self> {
        let digits = raw.trim().trim_start_matches("0x");
        match digits.len() {
            64 => LocalSigner::from_hex(raw)
                .map(Party::Key)
                .with_context(|| format!("party {name}: invalid secret key")),
            40 => raw
                .parse()
                .map(Party::Watch)
                .with_context(|| format!("party {name}: invalid address")),
            _ => bail!("party {name}: expected a 32-byte key or a 20-byte address"),
        }
    }

    fn address(&self) -> Address {
        match self {
            Party::Key(signer) => signer.address(),
            Party::Watch(address) => *address,
        }
    }
}

#[derive(Debug, Default)]
struct Parties(BTreeMap<String, Party>);

impl Parties {
    fn from_specs(specs: &BTreeMap<String, String>) -> Result<Self> {
        specs
            .iter()
            .map(|(name, raw)| Ok((name.clone(), Party::parse(name, raw)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Parties)
    }

    fn address(&self, name: &str) -> Result<Address> {
        self.0
            .get(name)
            .map(Party::address)
            .ok_or_else(|| anyhow!("unknown party {name}"))
    }

    fn signer(&self, name: &str) -> Result<&LocalSigner> {
        match self.0.get(name) {
            Some(Party::Key(signer)) => Ok(signer),
            Some(Party::Watch(_)) => bail!("party {name} has no key and cannot sign"),
            None => bail!("unknown party {name}"),
        }
    }

    fn substitute(&self, value: &mut Value) -> Result<()> {
        match value {
            Value::String(raw) => {
                if let Some(name) = raw.strip_prefix('@') {
                    *raw = self.address(name)?.to_string();
                } else if raw.eq_ignore_ascii_case("native") {
                    *raw = AssetId::NATIVE.to_string();
                }
            }
            Value::Sequence(items) => {
                for item in items {
                    self.substitute(item)?;
                }
            }
            Value::Mapping(map) => {
                for (_, item) in map.iter_mut() {
                    self.substitute(item)?;
                }
            }
            Value::Tagged(tagged) => self.substitute(&mut tagged.value)?,
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
        Ok(())
    }
}

fn parse_asset(raw: &str) -> Result<AssetId> {
    raw.parse()
        .with_context(|| format!("invalid asset {raw}"))
}

// ── Loading ─────────────────────────────────────────────────────────────

/// Parse a scenario document, resolving `@party` references.
pub fn parse_scenario(yaml: &str) -> Result<Scenario> {
    let mut document: Value = serde_yaml::from_str(yaml).context("scenario is not valid YAML")?;
    let parties: BTreeMap<String, String> = document
        .get("parties")
        .cloned()
        .map(serde_yaml::from_value)
        .transpose()
        .context("invalid parties section")?
        .unwrap_or_default();
    let resolved = Parties::from_specs(&parties)?;
    if let Value::Mapping(map) = &mut document {
        for (key, value) in map.iter_mut() {
            if key.as_str() != Some("parties") {
                resolved.substitute(value)?;
            }
        }
    }
    let resolved_yaml = serde_yaml::to_string(&document).context("failed to re-render scenario")?;
    serde_yaml::from_str(&resolved_yaml).context("invalid scenario")
}

/// Read and parse a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    parse_scenario(&raw).with_context(|| format!("in scenario {}", path.display()))
}

// ── Running ─────────────────────────────────────────────────────────────

fn build_offer(spec: &OfferSpec, parties: &Parties, start: Timestamp) -> Result<Offer> {
    Ok(Offer {
        id: OfferId::new(spec.id),
        seller: parties.address(&spec.seller)?,
        price: spec.price,
        seller_deposit: spec.seller_deposit,
        buyer_cancel_penalty: spec.buyer_cancel_penalty,
        asset: parse_asset(&spec.asset)?,
        quantity_available: spec.quantity,
        dispute_resolver: spec
            .resolver
            .as_deref()
            .map(|name| parties.address(name))
            .transpose()?,
        valid_from: start,
        valid_until: start.plus_seconds(spec.open_for),
        voucher_redeemable_from: start.plus_seconds(spec.redeemable_after),
        voucher_redeemable_until: None,
        voucher_valid_duration: spec.voucher_valid_duration,
        dispute_period: spec.dispute_period,
        resolution_period: spec.resolution_period,
        voided: false,
    })
}

fn build_resolver(spec: &ResolverSpec, parties: &Parties) -> Result<DisputeResolver> {
    let fees = spec
        .fees
        .iter()
        .map(|fee| {
            Ok(DisputeResolverFee {
                asset: parse_asset(&fee.asset)?,
                amount: fee.amount,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DisputeResolver {
        address: parties.address(&spec.party)?,
        escalation_response_period: spec.escalation_response_period,
        fees,
        active: spec.active,
    })
}

/// Run one action. The outer error is a scenario mistake; the inner result
/// is what the engine said.
fn perform(
    engine: &SettlementEngine,
    parties: &Parties,
    caller: Address,
    action: &Action,
) -> Result<(&'static str, Result<CallOutput, SettlementError>)> {
    let performed = match action {
        Action::Call(call) => (call.function_name(), engine.execute(caller, call)),
        Action::Resolve {
            exchange_id,
            buyer_percent,
            signed_by,
        } => {
            let percent = BasisPoints::new(*buyer_percent)
                .with_context(|| format!("cannot sign buyer_percent {buyer_percent}"))?;
            let message = ResolutionMessage {
                exchange_id: *exchange_id,
                buyer_percent: percent,
            };
            let signature = parties
                .signer(signed_by)?
                .sign_typed(engine.domain(), &message)
                .context("failed to sign resolution")?;
            let call = EngineCall::ResolveDispute {
                exchange_id: *exchange_id,
                buyer_percent: *buyer_percent,
                signature,
            };
            (call.function_name(), engine.execute(caller, &call))
        }
        Action::Relay {
            signer,
            nonce,
            call,
        } => {
            let meta = MetaTransaction::sign(parties.signer(signer)?, engine.domain(), *nonce, call.clone())
                .context("failed to sign meta-transaction")?;
            ("execute_meta_transaction", engine.execute_meta_transaction(caller, &meta))
        }
        Action::Pause(regions) => (
            "pause",
            engine.pause(caller, regions).map(|_| CallOutput::Unit),
        ),
        Action::Unpause(regions) => (
            "unpause",
            engine.unpause(caller, regions).map(|_| CallOutput::Unit),
        ),
    };
    Ok(performed)
}

/// Replay `scenario` and collect the report.
pub fn run_scenario(scenario: &Scenario) -> Result<SimulationReport> {
    let parties = Parties::from_specs(&scenario.parties)?;
    let mut config = scenario.config.clone();
    if let Some(pauser) = &scenario.pauser {
        config.pauser = parties.address(pauser)?;
    }

    let start = Timestamp::from_unix_seconds(scenario.start).context("invalid start time")?;
    let clock = Arc::new(ManualClock::new(start));
    let registry = Arc::new(InMemoryRegistry::new());
    let bank = Arc::new(InMemoryTokenBank::new());

    let mut assets = BTreeSet::from([AssetId::NATIVE]);
    for spec in &scenario.resolvers {
        registry.add_resolver(build_resolver(spec, &parties)?);
    }
    for spec in &scenario.offers {
        let offer = build_offer(spec, &parties, start)?;
        assets.insert(offer.asset);
        registry.add_offer(offer);
    }
    for funding in &scenario.funding {
        let asset = parse_asset(&funding.asset)?;
        assets.insert(asset);
        bank.mint(parties.address(&funding.party)?, asset, funding.amount);
    }

    let engine = SettlementEngine::new(config, registry, bank.clone(), clock.clone())
        .context("invalid engine configuration")?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let at = clock.advance_seconds(step.advance);
        let caller = parties.address(&step.caller)?;
        let (function, result) = perform(&engine, &parties, caller, &step.action)
            .with_context(|| format!("step {index}"))?;
        let as_expected = match (&result, step.expect_error) {
            (Ok(_), None) => true,
            (Err(err), Some(kind)) => err.kind() == kind,
            _ => false,
        };
        if as_expected {
            tracing::debug!(step = index, function, "step behaved as expected");
        } else {
            tracing::warn!(
                step = index,
                function,
                expected = ?step.expect_error,
                result = ?result,
                "step did not behave as expected"
            );
        }
        let (output, error, error_kind) = match result {
            Ok(output) => (Some(output), None, None),
            Err(err) => (None, Some(err.to_string()), Some(err.kind())),
        };
        steps.push(StepOutcome {
            step: index,
            caller: step.caller.clone(),
            function: function.to_string(),
            at,
            output,
            error,
            error_kind,
            as_expected,
        });
    }

    let mut balances = Vec::new();
    for (name, party) in &parties.0 {
        let address = party.address();
        for asset in &assets {
            balances.push(BalanceLine {
                party: name.clone(),
                address,
                asset: *asset,
                available: engine.get_available_funds(&address, asset)?,
                wallet: bank.balance_of(&address, asset),
            });
        }
    }

    Ok(SimulationReport {
        steps,
        events: engine.events(),
        balances,
    })
}

/// Execute `bazaar simulate`. Exits non-zero when a step misbehaves.
pub fn run_simulate(args: &SimulateArgs) -> Result<u8> {
    let scenario = load_scenario(&args.scenario)?;
    tracing::info!(
        scenario = %args.scenario.display(),
        steps = scenario.steps.len(),
        "running scenario"
    );
    let report = run_scenario(&scenario)?;
    let rendered = serde_json::to_string_pretty(&report).context("failed to render report")?;
    match &args.out {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => println!("{rendered}"),
    }
    if report.all_as_expected() {
        Ok(0)
    } else {
        let failed: Vec<usize> = report
            .steps
            .iter()
            .filter(|step| !step.as_expected)
            .map(|step| step.step)
            .collect();
        tracing::error!(steps = ?failed, "scenario steps did not behave as expected");
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUYER_KEY: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const SELLER_KEY: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";
    const RESOLVER_KEY: &str = "0x3333333333333333333333333333333333333333333333333333333333333333";

    fn scenario_yaml(steps: &str) -> String {
        format!(
            r#"
start: 1700000000
pauser: operator
parties:
  buyer: "{BUYER_KEY}"
  seller: "{SELLER_KEY}"
  resolver: "{RESOLVER_KEY}"
  operator: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
resolvers:
  - party: resolver
    escalation_response_period: 300
    fees: [{{ amount: 50 }}]
offers:
  - id: 1
    seller: seller
    price: 100
    seller_deposit: 20
    buyer_cancel_penalty: 10
    quantity: 3
    resolver: resolver
    voucher_valid_duration: 500
    dispute_period: 100
    resolution_period: 200
funding:
  - {{ party: buyer, amount: 1000 }}
  - {{ party: seller, amount: 1000 }}
steps:
  - caller: seller
    action: {{ call: {{ deposit_funds: {{ owner: "@seller", asset: native, amount: 100 }} }} }}
  - caller: buyer
    action: {{ call: {{ commit: {{ offer_id: 1 }} }} }}
  - caller: buyer
    action: {{ call: {{ redeem_voucher: {{ exchange_id: 1 }} }} }}
{steps}"#
        )
    }

    fn balance(report: &SimulationReport, party: &str) -> u128 {
        report
            .balances
            .iter()
            .find(|line| line.party == party && line.asset == AssetId::NATIVE)
            .map(|line| line.available)
            .unwrap()
    }

    #[test]
    fn party_references_are_resolved() {
        let scenario = parse_scenario(&scenario_yaml("")).unwrap();
        let seller = LocalSigner::from_hex(SELLER_KEY).unwrap().address();
        match &scenario.steps[0].action {
            Action::Call(EngineCall::DepositFunds { owner, asset, amount }) => {
                assert_eq!(*owner, seller);
                assert_eq!(*asset, AssetId::NATIVE);
                assert_eq!(*amount, 100);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn mutual_resolution_splits_the_pot() {
        let yaml = scenario_yaml(
            r#"
  - caller: buyer
    action: { call: { raise_dispute: { exchange_id: 1 } } }
  - caller: buyer
    action: { resolve: { exchange_id: 1, buyer_percent: 6000, signed_by: seller } }
"#,
        );
        let report = run_scenario(&parse_scenario(&yaml).unwrap()).unwrap();
        assert!(report.all_as_expected());
        assert_eq!(balance(&report, "buyer"), 72);
        assert_eq!(balance(&report, "seller"), 80 + 48);
        assert_eq!(
            report.events.last().map(|e| e.event.name()),
            Some("DisputeResolved")
        );
    }

    #[test]
    fn expected_errors_are_checked() {
        let yaml = scenario_yaml(
            r#"
  - caller: resolver
    action: { call: { raise_dispute: { exchange_id: 1 } } }
    expect_error: unauthorized
  - caller: buyer
    advance: 101
    action: { call: { raise_dispute: { exchange_id: 1 } } }
    expect_error: expired
  - caller: resolver
    action: { call: { complete_exchange: { exchange_id: 1 } } }
"#,
        );
        let report = run_scenario(&parse_scenario(&yaml).unwrap()).unwrap();
        assert!(report.all_as_expected(), "{:#?}", report.steps);
        assert_eq!(report.steps[3].error_kind, Some(ErrorKind::Unauthorized));
        assert_eq!(balance(&report, "seller"), 80 + 120);
    }

    #[test]
    fn unexpected_failure_is_reported() {
        let yaml = scenario_yaml(
            r#"
  - caller: buyer
    action: { call: { redeem_voucher: { exchange_id: 1 } } }
"#,
        );
        let report = run_scenario(&parse_scenario(&yaml).unwrap()).unwrap();
        assert!(!report.all_as_expected());
        assert_eq!(report.steps[3].error_kind, Some(ErrorKind::InvalidState));
    }

    #[test]
    fn relay_and_pause_actions() {
        let yaml = scenario_yaml(
            r#"
  - caller: operator
    action: { pause: [Disputes] }
  - caller: operator
    action: { relay: { signer: buyer, nonce: 0, call: { raise_dispute: { exchange_id: 1 } } } }
    expect_error: region_paused
  - caller: operator
    action: { unpause: [] }
  - caller: operator
    action: { relay: { signer: buyer, nonce: 0, call: { raise_dispute: { exchange_id: 1 } } } }
"#,
        );
        let report = run_scenario(&parse_scenario(&yaml).unwrap()).unwrap();
        assert!(report.all_as_expected(), "{:#?}", report.steps);
        assert_eq!(report.steps[6].function, "execute_meta_transaction");
        assert!(report
            .events
            .iter()
            .any(|e| e.event.name() == "MetaTransactionExecuted"));
    }

    #[test]
    fn unknown_party_is_a_scenario_error() {
        let yaml = scenario_yaml(
            r#"
  - caller: nobody
    action: { call: { commit: { offer_id: 1 } } }
"#,
        );
        let err = run_scenario(&parse_scenario(&yaml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }

    #[test]
    fn unknown_reference_fails_parsing() {
        let yaml = scenario_yaml(
            r#"
  - caller: buyer
    action: { call: { transfer_voucher: { exchange_id: 1, new_holder: "@ghost" } } }
"#,
        );
        let err = parse_scenario(&yaml).unwrap_err();
        assert!(format!("{err:#}").contains("ghost"));
    }

    #[test]
    fn watch_only_party_cannot_sign() {
        let yaml = scenario_yaml(
            r#"
  - caller: buyer
    action: { call: { raise_dispute: { exchange_id: 1 } } }
  - caller: buyer
    action: { resolve: { exchange_id: 1, buyer_percent: 5000, signed_by: operator } }
"#,
        );
        let err = run_scenario(&parse_scenario(&yaml).unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("cannot sign"));
    }

    #[test]
    fn simulate_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = dir.path().join("scenario.yaml");
        let out = dir.path().join("report.json");
        std::fs::write(&scenario, scenario_yaml("")).unwrap();
        let code = run_simulate(&SimulateArgs {
            scenario,
            out: Some(out.clone()),
        })
        .unwrap();
        assert_eq!(code, 0);
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(report["steps"].as_array().unwrap().len(), 3);
        assert_eq!(report["events"][0]["event"]["type"], "FundsDeposited");
    }

    #[test]
    fn bundled_scenarios_run_clean() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        let mut found = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
                continue;
            }
            let report = run_scenario(&load_scenario(&path).unwrap()).unwrap();
            assert!(report.all_as_expected(), "{}: {:#?}", path.display(), report.steps);
            found += 1;
        }
        assert!(found > 0);
    }
}
