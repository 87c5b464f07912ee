use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tally_ledger::{EntryDraft, LedgerEntry, LedgerError, LedgerReader, LedgerWriter};
use tally_types::{AccountId, CurrencyCode, EntryId, EntryKind, Reference, SessionId};
use tracing::{debug, error, info, warn};

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::payout::{self, Payout};
use crate::session::{Credit, SessionEvent, SettlementReport, SettlementState};

struct SessionSlot {
    report: SettlementReport,
    /// Set while one call owns the session's legs.
    busy: bool,
}

enum Claim {
    /// The session already reached a terminal state.
    Finished(SettlementReport),
    Claimed(SettlementReport),
}

/// Drives game sessions through fee collection and payout.
///
/// Every leg is an ordinary ledger append with kind `game_settlement` and
/// the session as reference. Legs commit one at a time; when one fails the
/// coordinator reverses every applied leg, newest first, and the session
/// ends `failed`. Sessions are independent and may settle concurrently.
pub struct SettlementCoordinator<L> {
    ledger: Arc<L>,
    config: SettlementConfig,
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
}

impl<L: LedgerWriter + LedgerReader> SettlementCoordinator<L> {
    pub fn new(ledger: Arc<L>, config: SettlementConfig) -> Result<Self, SettlementError> {
        config.validate()?;
        Ok(Self {
            ledger,
            config,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Dispatch a lifecycle event to the matching operation.
    pub fn handle(&self, event: SessionEvent) -> Result<SettlementReport, SettlementError> {
        match event {
            SessionEvent::Started {
                session,
                participants,
                entry_fee,
                currency,
            } => self.session_started(&session, &participants, entry_fee, &currency),
            SessionEvent::Completed {
                session,
                final_ranking,
                scores,
            } => self.session_completed(&session, &final_ranking, &scores),
            SessionEvent::Abandoned { session } => self.session_abandoned(&session),
        }
    }

    /// Collect `entry_fee` from every participant.
    ///
    /// Calling again for a session this coordinator already knows returns
    /// its current report without touching the ledger.
    pub fn session_started(
        &self,
        session: &SessionId,
        participants: &[AccountId],
        entry_fee: i64,
        currency: &CurrencyCode,
    ) -> Result<SettlementReport, SettlementError> {
        validate_participants(participants, entry_fee)?;

        let mut report = {
            let mut sessions = self.lock()?;
            if let Some(slot) = sessions.get(session) {
                debug!(session = %session, state = %slot.report.state, "session already started");
                return Ok(slot.report.clone());
            }
            self.ensure_unsettled(session)?;

            let mut report = SettlementReport::new(
                session.clone(),
                currency.clone(),
                participants.to_vec(),
                entry_fee,
            );
            report.state = SettlementState::Collecting;
            sessions.insert(
                session.clone(),
                SessionSlot {
                    report: report.clone(),
                    busy: true,
                },
            );
            report
        };

        info!(
            session = %session,
            participants = participants.len(),
            entry_fee,
            currency = %currency,
            "collecting entry fees"
        );

        let reference = Reference::session(session);
        for account in participants {
            let draft = EntryDraft::new(
                account.clone(),
                currency.clone(),
                -entry_fee,
                EntryKind::GameSettlement,
                reference.clone(),
            )
            .with_memo("entry fee");

            let collected = self
                .ledger
                .append(&draft)
                .map_err(|e| format!("collecting fee from {account}: {e}"))
                .and_then(|entry| {
                    report.entries.push(entry.id);
                    report
                        .collected
                        .checked_add(entry_fee)
                        .ok_or_else(|| "collected total overflows".to_string())
                });
            match collected {
                Ok(total) => report.collected = total,
                Err(reason) => {
                    self.fail(&mut report, reason);
                    break;
                }
            }
        }

        if report.state == SettlementState::Collecting {
            info!(session = %session, collected = report.collected, "entry fees collected");
        }
        self.release(report)
    }

    /// Pay out the pool over `final_ranking` (best first).
    ///
    /// Neighbours in the ranking with equal `scores` share a rank.
    pub fn session_completed(
        &self,
        session: &SessionId,
        final_ranking: &[AccountId],
        scores: &BTreeMap<AccountId, i64>,
    ) -> Result<SettlementReport, SettlementError> {
        let claim = self.claim(session, "complete", SettlementState::Distributing, |report| {
            payout::validate_ranking(final_ranking, &report.participants)
        })?;
        let mut report = match claim {
            Claim::Finished(report) => return Ok(report),
            Claim::Claimed(report) => report,
        };
        info!(session = %session, collected = report.collected, "distributing reward pool");

        let groups = payout::rank_groups(final_ranking, scores);
        let payout = match payout::compute(report.collected, &groups, &self.config)
            .and_then(|p| p.ensure_balanced().map(|()| p))
        {
            Ok(payout) => payout,
            Err(err) => {
                self.fail(&mut report, err.to_string());
                return self.release(report);
            }
        };
        report.pool = payout.pool;
        report.commission = payout.commission;

        if let Err(reason) = self.distribute(&mut report, &payout) {
            self.fail(&mut report, reason);
            return self.release(report);
        }

        report.state = SettlementState::Settled;
        info!(
            session = %session,
            pool = report.pool,
            commission = report.commission,
            winners = report.credits.len(),
            "session settled"
        );
        self.release(report)
    }

    /// Cancel a session that is still collecting and return every fee.
    pub fn session_abandoned(&self, session: &SessionId) -> Result<SettlementReport, SettlementError> {
        let claim = self.claim(session, "abandon", SettlementState::Collecting, |_| Ok(()))?;
        let mut report = match claim {
            Claim::Finished(report) => return Ok(report),
            Claim::Claimed(report) => report,
        };
        info!(session = %session, "session abandoned");
        self.fail(&mut report, "session abandoned".into());
        self.release(report)
    }

    /// The latest report for a session known to this coordinator.
    pub fn outcome(&self, session: &SessionId) -> Result<Option<SettlementReport>, SettlementError> {
        Ok(self.lock()?.get(session).map(|slot| slot.report.clone()))
    }

    /// Reports of every known session, ordered by session id.
    pub fn reports(&self) -> Result<Vec<SettlementReport>, SettlementError> {
        let mut reports: Vec<SettlementReport> =
            self.lock()?.values().map(|slot| slot.report.clone()).collect();
        reports.sort_by(|a, b| a.session.cmp(&b.session));
        Ok(reports)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionSlot>>, SettlementError> {
        self.sessions.lock().map_err(|_| SettlementError::LockPoisoned)
    }

    /// A session id this coordinator never saw must not already have legs
    /// in the ledger.
    fn ensure_unsettled(&self, session: &SessionId) -> Result<(), SettlementError> {
        let existing = self.ledger.entries_by_reference(&Reference::session(session))?;
        if existing.iter().any(|e| e.kind == EntryKind::GameSettlement) {
            warn!(session = %session, entries = existing.len(), "session replay rejected");
            return Err(SettlementError::AlreadySettled(session.clone()));
        }
        Ok(())
    }

    /// Take ownership of a `collecting` session and move it to `next`.
    fn claim(
        &self,
        session: &SessionId,
        operation: &'static str,
        next: SettlementState,
        check: impl FnOnce(&SettlementReport) -> Result<(), SettlementError>,
    ) -> Result<Claim, SettlementError> {
        let mut sessions = self.lock()?;
        let Some(slot) = sessions.get_mut(session) else {
            self.ensure_unsettled(session)?;
            return Err(SettlementError::UnknownSession(session.clone()));
        };

        if slot.report.state.is_terminal() {
            debug!(session = %session, state = %slot.report.state, "returning prior report");
            return Ok(Claim::Finished(slot.report.clone()));
        }
        if slot.busy {
            return Err(SettlementError::Busy {
                session: session.clone(),
            });
        }
        if slot.report.state != SettlementState::Collecting {
            return Err(SettlementError::InvalidState {
                session: session.clone(),
                state: slot.report.state,
                operation,
            });
        }
        check(&slot.report)?;

        slot.busy = true;
        slot.report.state = next;
        Ok(Claim::Claimed(slot.report.clone()))
    }

    /// Store the report and give the session back.
    fn release(&self, report: SettlementReport) -> Result<SettlementReport, SettlementError> {
        let mut sessions = self.lock()?;
        sessions.insert(
            report.session.clone(),
            SessionSlot {
                report: report.clone(),
                busy: false,
            },
        );
        Ok(report)
    }

    fn distribute(&self, report: &mut SettlementReport, payout: &Payout) -> Result<(), String> {
        let reference = Reference::session(&report.session);
        let house = Credit {
            account: self.config.house_account.clone(),
            amount: payout.commission,
        };

        for credit in &payout.credits {
            let entry = self
                .credit(&reference, &report.currency, credit, "payout")
                .map_err(|e| format!("crediting {}: {e}", credit.account))?;
            report.entries.push(entry.id);
            report.credits.push(credit.clone());
        }
        if house.amount > 0 {
            let entry = self
                .credit(&reference, &report.currency, &house, "house commission")
                .map_err(|e| format!("crediting house {}: {e}", house.account))?;
            report.entries.push(entry.id);
        }
        Ok(())
    }

    fn credit(
        &self,
        reference: &Reference,
        currency: &CurrencyCode,
        credit: &Credit,
        memo: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let draft = EntryDraft::new(
            credit.account.clone(),
            currency.clone(),
            credit.amount,
            EntryKind::GameSettlement,
            reference.clone(),
        )
        .with_memo(memo);
        self.ledger.append(&draft)
    }

    /// Reverse every applied leg, newest first, and mark the session failed.
    fn fail(&self, report: &mut SettlementReport, reason: String) {
        warn!(
            session = %report.session,
            legs = report.entries.len(),
            reason = %reason,
            "compensating settlement"
        );
        let memo = format!("compensating session {}", report.session);
        for &leg in report.entries.iter().rev() {
            match self.compensate(leg, &memo) {
                Ok(reversal) => report.compensations.push(reversal.id),
                Err(err) => {
                    error!(
                        session = %report.session,
                        entry = %leg,
                        error = %err,
                        "compensation failed, leg left applied"
                    );
                    report.uncompensated.push(leg);
                }
            }
        }
        report.credits.clear();
        report.state = SettlementState::Failed;
        report.failure = Some(reason);
    }

    fn compensate(&self, leg: EntryId, memo: &str) -> Result<LedgerEntry, LedgerError> {
        let mut attempt = 1;
        loop {
            match self.ledger.reverse(leg, memo) {
                Err(err) if err.is_retryable() && attempt < self.config.compensation_attempts => {
                    warn!(entry = %leg, attempt, error = %err, "retrying compensation");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn validate_participants(participants: &[AccountId], entry_fee: i64) -> Result<(), SettlementError> {
    if participants.is_empty() {
        return Err(SettlementError::InvalidSession("no participants".into()));
    }
    if entry_fee <= 0 {
        return Err(SettlementError::InvalidSession(format!(
            "entry fee must be positive, got {entry_fee}"
        )));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = participants.iter().find(|a| !seen.insert(*a)) {
        return Err(SettlementError::InvalidSession(format!(
            "{dup} joined more than once"
        )));
    }
    Ok(())
}
