/// 别名递归解析
///
/// AOR 的绑定可能是另一个 AOR 的别名（如呼叫转移）。解析器从根 AOR
/// 开始并发拉取各个别名，汇总所有可达的非别名联系人，深度受限。
///
/// 所有分支由同一个任务通过 `FuturesUnordered` 驱动，聚合状态只在该
/// 任务内修改，分支完成的先后顺序不影响计数的正确性。
use crate::backend::{Backend, RegistrarBackend};
use crate::contact::ExtendedContact;
use crate::error::{RegistrarError, Result};
use crate::record::{Record, RecordLimits};
use crate::sip::Aor;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

type BranchId = u64;

struct BranchOutcome {
    id: BranchId,
    depth: u32,
    result: Result<Option<Record>>,
}

/// 一次递归解析的聚合状态
struct Aggregation {
    request_id: Uuid,
    root: Aor,
    next_branch: BranchId,
    /// 未完成的分支
    pending: HashMap<BranchId, Aor>,
    contacts: Vec<ExtendedContact>,
    errors: Vec<(Aor, RegistrarError)>,
    invalid: Vec<(Aor, RegistrarError)>,
}

impl Aggregation {
    fn new(root: Aor) -> Self {
        Self {
            request_id: crate::utils::make_request_id(),
            root,
            next_branch: 0,
            pending: HashMap::new(),
            contacts: Vec::new(),
            errors: Vec::new(),
            invalid: Vec::new(),
        }
    }

    fn open_branch(&mut self, aor: Aor) -> BranchId {
        let id = self.next_branch;
        self.next_branch += 1;
        self.pending.insert(id, aor);
        id
    }

    fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// 同一身份键只保留先到的联系人
    fn accumulate(&mut self, contact: &ExtendedContact) {
        if !self
            .contacts
            .iter()
            .any(|existing| existing.contact_id() == contact.contact_id())
        {
            self.contacts.push(contact.clone());
        }
    }

    /// 所有分支完成后的结果
    ///
    /// 有联系人时返回合并记录（忽略失败分支）；否则任一分支的后端
    /// 错误优先，其次是无效请求，都没有则视为未找到。
    fn finish(self, limits: RecordLimits) -> Result<Option<Record>> {
        if !self.contacts.is_empty() {
            for (aor, err) in self.errors.iter().chain(self.invalid.iter()) {
                warn!(
                    request_id = %self.request_id,
                    "丢弃失败分支 {}: {}",
                    aor.key(),
                    err
                );
            }
            debug!(
                request_id = %self.request_id,
                "递归解析 {} 完成: {} 个联系人",
                self.root.key(),
                self.contacts.len()
            );
            return Ok(Some(Record::with_contacts(
                self.root.key(),
                limits,
                self.contacts,
            )));
        }

        if let Some((_, err)) = self.errors.into_iter().next() {
            return Err(err);
        }
        if let Some((_, err)) = self.invalid.into_iter().next() {
            return Err(err);
        }
        debug!(request_id = %self.request_id, "递归解析 {} 未找到联系人", self.root.key());
        Ok(None)
    }
}

/// 递归解析器
pub struct RecursiveResolver<'a> {
    backend: &'a Backend,
    limits: RecordLimits,
    max_depth: u32,
}

impl<'a> RecursiveResolver<'a> {
    pub fn new(backend: &'a Backend, limits: RecordLimits, max_depth: u32) -> Self {
        Self {
            backend,
            limits,
            max_depth,
        }
    }

    /// 解析 AOR，返回所有可达的联系人
    ///
    /// 深度为 0 时别名不再展开，原样放入结果。
    pub async fn resolve(&self, root: &Aor, now: i64) -> Result<Option<Record>> {
        let mut state = Aggregation::new(root.clone());
        let mut in_flight: FuturesUnordered<BoxFuture<'a, BranchOutcome>> = FuturesUnordered::new();

        let id = state.open_branch(root.clone());
        in_flight.push(self.branch(id, root.clone(), self.max_depth));

        while let Some(outcome) = in_flight.next().await {
            let Some(aor) = state.pending.remove(&outcome.id) else {
                continue;
            };

            match outcome.result {
                Ok(Some(record)) => {
                    for contact in record.live_contacts(now) {
                        if !contact.is_alias() || outcome.depth == 0 {
                            state.accumulate(contact);
                            continue;
                        }
                        match Aor::parse(contact.sip_uri()) {
                            Ok(alias) => {
                                debug!(
                                    request_id = %state.request_id,
                                    "{} 是别名, 继续解析 {} (剩余深度 {})",
                                    contact.sip_uri(),
                                    alias.key(),
                                    outcome.depth - 1
                                );
                                let id = state.open_branch(alias.clone());
                                in_flight.push(self.branch(id, alias, outcome.depth - 1));
                            }
                            Err(err) => {
                                warn!(
                                    request_id = %state.request_id,
                                    "无法解析别名 {}: {}",
                                    contact.sip_uri(),
                                    err
                                );
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(err) if err.is_invalid() => state.invalid.push((aor, err)),
                Err(err) => state.errors.push((aor, err)),
            }

            debug!(
                request_id = %state.request_id,
                "分支 {} 完成, 剩余 {}",
                outcome.id,
                state.outstanding()
            );
        }

        state.finish(self.limits.clone())
    }

    fn branch(&self, id: BranchId, aor: Aor, depth: u32) -> BoxFuture<'a, BranchOutcome> {
        let backend = self.backend;
        Box::pin(async move {
            let result = backend.do_fetch(&aor).await;
            BranchOutcome { id, depth, result }
        })
    }
}
