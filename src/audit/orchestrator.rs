//! Scan, audit-apply, precheck and watch management.
//!
//! # Design Decisions
//! - Registry writes use the publisher key and block until mined
//! - The orchestrator never signs the wallet's own actions; audit-apply
//!   returns an unsigned template instead
//! - Precheck fails open, unlike the monitor's post-audit

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256};
use serde_json::{json, Value};

use crate::audit::types::{
    ApplyMode, AuditApplyRequest, AuditApplyResponse, AuditError, AuditResult, PrecheckRequest,
    PrecheckResponse, ScanResponse, TxNoteResponse, TxTemplate, WatchListResponse,
};
use crate::blockchain::transaction::TxSigner;
use crate::blockchain::types::BlockTag;
use crate::blockchain::wallet::{KeyRole, Wallet};
use crate::config::schema::SignerConfig;
use crate::contracts::guard::{init_calldata, set_implementation_calldata};
use crate::contracts::{ChainContracts, RegistryClient, TxOutcome};
use crate::monitor::tick::load_impl_record_json;
use crate::oracle::{classify_with_retry, AuditVerdict, OracleContext, RiskOracle};
use crate::resilience::RetryPolicy;
use crate::state::{StateStore, WatchItem};

/// Composes contract clients and the risk oracle into request-level flows.
pub struct AuditOrchestrator {
    chains: HashMap<u64, ChainContracts>,
    store: StateStore,
    oracle: Arc<dyn RiskOracle>,
    retry: RetryPolicy,
    signer_config: SignerConfig,
    publisher: Option<Wallet>,
    sentinel_address: Address,
}

impl AuditOrchestrator {
    pub fn new(store: StateStore, oracle: Arc<dyn RiskOracle>) -> Self {
        Self {
            chains: HashMap::new(),
            store,
            oracle,
            retry: RetryPolicy::default(),
            signer_config: SignerConfig::default(),
            publisher: None,
            sentinel_address: Address::ZERO,
        }
    }

    pub fn with_chain(mut self, contracts: ChainContracts) -> Self {
        self.chains.insert(contracts.chain_id, contracts);
        self
    }

    pub fn with_publisher(mut self, wallet: Wallet) -> Self {
        self.publisher = Some(wallet);
        self
    }

    /// Address written into `aegis_init` templates as the sentinel.
    pub fn with_sentinel_address(mut self, address: Address) -> Self {
        self.sentinel_address = address;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_signer_config(mut self, config: SignerConfig) -> Self {
        self.signer_config = config;
        self
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Classify the bytecode at `impl_address` and publish the verdict.
    pub async fn scan(&self, chain_id: u64, impl_address: Address) -> AuditResult<ScanResponse> {
        let chain = self.chain(chain_id)?;
        let registry = chain.registry()?;
        let signer = self.publisher_signer(chain)?;

        let bytecode = code_at(chain, impl_address, "implAddress").await?;
        let audit = self
            .classify(OracleContext::ImplBytecode {
                chain_id,
                impl_address,
                bytecode,
            })
            .await?;

        let outcome = registry
            .set_record_current(&signer, impl_address, audit.verdict(), &audit.record_text())
            .await?;
        log_publish(chain_id, "setRecordCurrent", &outcome);

        tracing::info!(chain_id, impl_address = %impl_address, label = %audit.label, "Implementation scanned");

        Ok(ScanResponse {
            chain_id,
            impl_address,
            reasons_text: audit.reasons_text(),
            audit,
            registry_tx_hash: outcome.sent.tx_hash,
        })
    }

    /// Audit `new_impl_address` (and, when swapping, the swap from the
    /// wallet's current implementation) and hand back a template when both
    /// verdicts are safe.
    pub async fn audit_apply(&self, req: &AuditApplyRequest) -> AuditResult<AuditApplyResponse> {
        let chain_id = req.chain_id;
        let chain = self.chain(chain_id)?;
        let registry = chain.registry()?;
        let signer = self.publisher_signer(chain)?;

        let current_impl = match req.mode {
            ApplyMode::Swap => Some(
                chain
                    .guard
                    .get_implementation(req.wallet)
                    .await
                    .map_err(AuditError::WalletRead)?,
            ),
            ApplyMode::Init => None,
        };

        let new_bytecode = code_at(chain, req.new_impl_address, "newImplAddress").await?;
        let new_audit = self
            .classify(OracleContext::ImplBytecode {
                chain_id,
                impl_address: req.new_impl_address,
                bytecode: new_bytecode.clone(),
            })
            .await?;
        let new_outcome = registry
            .set_record_current(&signer, req.new_impl_address, new_audit.verdict(), &new_audit.record_text())
            .await?;
        log_publish(chain_id, "setRecordCurrent", &new_outcome);

        let mut allow = new_audit.is_safe();

        let mut swap = None;
        if let Some(current) = current_impl {
            let (swap_audit, swap_hash) = self
                .audit_swap(chain, registry, &signer, current, req.new_impl_address, new_bytecode)
                .await?;
            allow = allow && swap_audit.is_safe();
            swap = Some((swap_audit, swap_hash));
        }

        let tx_template = if allow {
            let data = match req.mode {
                ApplyMode::Swap => set_implementation_calldata(req.new_impl_address)?,
                ApplyMode::Init => init_calldata(req.new_impl_address, req.wallet, self.sentinel_address)?,
            };
            Some(TxTemplate::self_call(req.wallet, data))
        } else {
            None
        };

        tracing::info!(
            chain_id,
            wallet = %req.wallet,
            new_impl = %req.new_impl_address,
            mode = ?req.mode,
            allow,
            "Audit-apply finished"
        );

        let (swap_audit, swap_registry_tx_hash) = match swap {
            Some((audit, hash)) => (Some(audit), Some(hash)),
            None => (None, None),
        };

        Ok(AuditApplyResponse {
            chain_id,
            wallet: req.wallet,
            mode: req.mode,
            current_impl,
            new_impl: req.new_impl_address,
            new_impl_reasons_text: new_audit.reasons_text(),
            new_impl_audit: new_audit,
            new_impl_registry_tx_hash: new_outcome.sent.tx_hash,
            swap_reasons_text: swap_audit.as_ref().map(AuditVerdict::reasons_text),
            swap_audit,
            swap_registry_tx_hash,
            allow,
            tx_template,
        })
    }

    async fn audit_swap(
        &self,
        chain: &ChainContracts,
        registry: &RegistryClient,
        signer: &TxSigner,
        current: Address,
        new_impl: Address,
        new_bytecode: Bytes,
    ) -> AuditResult<(AuditVerdict, B256)> {
        let current_bytecode = code_at(chain, current, "current impl").await?;
        let audit = self
            .classify(OracleContext::Swap {
                chain_id: chain.chain_id,
                current_impl_address: current,
                current_bytecode,
                new_impl_address: new_impl,
                new_bytecode,
            })
            .await?;

        let outcome = registry
            .set_swap_record_current(signer, current, new_impl, audit.verdict(), &audit.record_text())
            .await?;
        log_publish(chain.chain_id, "setSwapRecordCurrent", &outcome);

        Ok((audit, outcome.sent.tx_hash))
    }

    /// Assess a pending transaction. Oracle failures yield an allow with
    /// zero confidence.
    pub async fn precheck(&self, req: &PrecheckRequest) -> AuditResult<PrecheckResponse> {
        let chain_id = req.chain_id;
        let chain = self.chain(chain_id)?;

        let tx = json!({
            "from": req.from,
            "to": req.to,
            "value": req.value,
            "data": req.data,
            "type": req.tx_type,
            "authorizationList": req.authorization_list.clone().unwrap_or_default(),
            "selector": req.selector(),
            "authorizationListDelegateTargets": req.delegate_targets(),
            "aegis": {
                "expectedGuard": chain.guard_address,
                "registry": chain.registry.as_ref().map(RegistryClient::address),
            },
        });

        let impl_record = load_impl_record_json(&chain.guard, chain.registry.as_ref(), req.from).await;
        let wallet_current_impl = impl_record
            .get("implAddress")
            .cloned()
            .and_then(|v| serde_json::from_value::<Address>(v).ok());

        let context = OracleContext::TxPrecheck {
            chain_id,
            tx,
            impl_record: impl_record.clone(),
        };
        let audit = match classify_with_retry(self.oracle.as_ref(), &context, &self.retry).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(chain_id, wallet = %req.from, error = %e, "Precheck failed; allowing by policy");
                AuditVerdict::fail_open(&e)
            }
        };

        Ok(PrecheckResponse {
            chain_id,
            allow: audit.is_safe(),
            reasons_text: audit.reasons_text(),
            audit,
            wallet_current_impl,
            wallet_current_impl_record: impl_record,
        })
    }

    /// Watch `wallet` from the next block onwards.
    pub async fn watch_wallet(&self, chain_id: u64, wallet: Address) -> AuditResult<WatchItem> {
        let chain = self.chain(chain_id)?;
        let latest = chain.rpc.block_number().await?;
        let item = self.store.add_watch(chain_id, wallet, latest + 1)?;
        tracing::info!(chain_id, wallet = %wallet, start_block = item.start_block, "Wallet watched");
        Ok(item)
    }

    /// Returns whether the wallet was watched.
    pub fn unwatch_wallet(&self, chain_id: u64, wallet: Address) -> AuditResult<bool> {
        let removed = self.store.remove_watch(chain_id, wallet)?;
        if removed {
            tracing::info!(chain_id, wallet = %wallet, "Wallet unwatched");
        }
        Ok(removed)
    }

    pub fn list_watch(&self, chain_id: u64) -> AuditResult<WatchListResponse> {
        Ok(WatchListResponse {
            chain_id,
            items: self.store.list_watch(chain_id)?,
        })
    }

    /// The note stored at `wallet` for `tx_hash`; `updatedAt` is zero when
    /// the transaction has not been audited.
    pub async fn tx_note(&self, chain_id: u64, wallet: Address, tx_hash: B256) -> AuditResult<TxNoteResponse> {
        let chain = self.chain(chain_id)?;
        let note = chain.guard.get_tx_note(wallet, tx_hash).await?;
        Ok(TxNoteResponse { wallet, tx_hash, note })
    }

    fn chain(&self, chain_id: u64) -> AuditResult<&ChainContracts> {
        self.chains.get(&chain_id).ok_or(AuditError::UnknownChain(chain_id))
    }

    fn publisher_signer(&self, chain: &ChainContracts) -> AuditResult<TxSigner> {
        let wallet = self
            .publisher
            .clone()
            .ok_or(AuditError::MissingKey(KeyRole::Publisher))?;
        Ok(TxSigner::new(
            chain.rpc.clone(),
            chain.chain_id,
            wallet,
            self.signer_config.clone(),
        ))
    }

    async fn classify(&self, context: OracleContext) -> AuditResult<AuditVerdict> {
        Ok(classify_with_retry(self.oracle.as_ref(), &context, &self.retry).await?)
    }
}

async fn code_at(chain: &ChainContracts, address: Address, what: &'static str) -> AuditResult<Bytes> {
    let code = chain.rpc.get_code(address, BlockTag::Latest).await?;
    if code.is_empty() {
        return Err(AuditError::NoCode { what, address });
    }
    Ok(code)
}

fn log_publish(chain_id: u64, function: &str, outcome: &TxOutcome) {
    if outcome.succeeded() {
        tracing::info!(chain_id, function, tx_hash = %outcome.sent.tx_hash, "Registry record published");
    } else {
        tracing::warn!(chain_id, function, tx_hash = %outcome.sent.tx_hash, "Registry write reverted");
    }
}

impl std::fmt::Debug for AuditOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditOrchestrator")
            .field("chains", &self.chain_ids())
            .field("oracle", &self.oracle.name())
            .field("publisher", &self.publisher)
            .field("sentinel_address", &self.sentinel_address)
            .finish()
    }
}
