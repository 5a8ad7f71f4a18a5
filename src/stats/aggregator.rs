//! Session reducer.
//!
//! One active play session at a time. Attempts are folded in submission
//! order; `end_session` turns the running totals into an immutable
//! [`SessionRecord`], applies it to cumulative [`Progress`] and only then
//! emits `progressUpdated`.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::clock::stamp_after;
use crate::config::CoreConfig;
use crate::domain::{accuracy_of, Achievement, AgeGroup, Progress, SessionRecord, UserIdentity};
use crate::error::StatsError;
use crate::persistence::LocalRepository;
use crate::session::{CoreEvent, EventBus};
use crate::stats::{adapt, Adaptation, AchievementTracker, Attempt, PerformanceCache};

/// `base · correct · (1 + streakBonus · longestStreak) − hintPenalty · hints`,
/// clamped at zero and rounded.
pub fn score(config: &CoreConfig, game_type: &str, correct: u64, longest_streak: u64, hints: u64) -> u64 {
    let raw = config.score_base_for(game_type) * correct as f64 * (1.0 + config.streak_bonus * longest_streak as f64)
        - config.hint_penalty * hints as f64;
    raw.max(0.0).round() as u64
}

/// What `end_session` produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub record: SessionRecord,
    pub progress: Progress,
    /// Achievements that became unlocked by this session.
    pub unlocked: Vec<Achievement>,
}

#[derive(Debug)]
struct ActiveSession {
    game_type: String,
    difficulty: u8,
    age_group: AgeGroup,
    started_at: u64,
    questions_answered: u64,
    correct_answers: u64,
    hints_used: u64,
    current_streak: u64,
    longest_streak: u64,
    sum_response_ms: u64,
    recent: VecDeque<Attempt>,
    cooldown: u32,
}

impl ActiveSession {
    fn new(game_type: String, difficulty: u8, age_group: AgeGroup, started_at: u64) -> Self {
        Self {
            game_type,
            difficulty,
            age_group,
            started_at,
            questions_answered: 0,
            correct_answers: 0,
            hints_used: 0,
            current_streak: 0,
            longest_streak: 0,
            sum_response_ms: 0,
            recent: VecDeque::new(),
            cooldown: 0,
        }
    }

    fn fold(&mut self, attempt: &Attempt, window: usize) {
        self.questions_answered += 1;
        self.sum_response_ms += attempt.response_time_ms;
        if attempt.hint_used {
            self.hints_used += 1;
        }
        if attempt.is_correct {
            self.correct_answers += 1;
            self.current_streak += 1;
            self.longest_streak = self.longest_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }
        self.difficulty = attempt.difficulty;
        self.age_group = attempt.age_group;

        self.recent.push_back(attempt.clone());
        while self.recent.len() > window {
            self.recent.pop_front();
        }
    }
}

pub struct StatisticsAggregator {
    repo: LocalRepository,
    bus: EventBus,
    config: CoreConfig,
    tracker: Option<AchievementTracker>,
    active: Mutex<Option<ActiveSession>>,
}

impl StatisticsAggregator {
    pub fn new(repo: LocalRepository, bus: EventBus, config: CoreConfig) -> Self {
        Self {
            repo,
            bus,
            config,
            tracker: None,
            active: Mutex::new(None),
        }
    }

    /// Evaluates achievements at the end of every session.
    pub fn with_achievements(mut self, tracker: AchievementTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Starts a session, discarding any unfinished one.
    pub fn start_session(&self, game_type: &str, difficulty: u8, age_group: AgeGroup) {
        let now = self.repo.clock().now();
        let mut active = self.active.lock();
        if let Some(old) = active.as_ref() {
            log::warn!(
                "[STATS] discarding unfinished `{}` session ({} attempts)",
                old.game_type,
                old.questions_answered
            );
        }
        log::debug!("[STATS] session started: {} at difficulty {}", game_type, difficulty);
        *active = Some(ActiveSession::new(game_type.to_string(), difficulty, age_group, now));
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Folds one attempt into the active session, starting one if needed,
    /// and returns the difficulty hint for the next question.
    pub fn on_attempt(&self, attempt: Attempt) -> Result<Adaptation, StatsError> {
        let mut guard = self.active.lock();
        if let Some(s) = guard.as_ref() {
            if s.game_type != attempt.game_type {
                return Err(StatsError::GameMismatch {
                    active: s.game_type.clone(),
                    got: attempt.game_type,
                });
            }
        }
        if guard.is_none() {
            let started_at = if attempt.timestamp > 0 {
                attempt.timestamp
            } else {
                self.repo.clock().now()
            };
            *guard = Some(ActiveSession::new(
                attempt.game_type.clone(),
                attempt.difficulty,
                attempt.age_group,
                started_at,
            ));
        }
        let session = guard.as_mut().ok_or(StatsError::NoActiveSession)?;

        session.fold(&attempt, self.config.adapt_window);
        let recent: Vec<Attempt> = session.recent.iter().cloned().collect();
        let signal = adapt(&recent, session.difficulty, session.cooldown, &self.config);
        session.cooldown = signal.cooldown_remaining;
        Ok(signal)
    }

    /// Drops the active session without recording it.
    pub fn abandon_session(&self) -> bool {
        self.active.lock().take().is_some()
    }

    /// Records the active session for `identity` and updates its progress.
    /// If the record or the progress cannot be stored, nothing is kept and
    /// the session stays active.
    ///
    /// # Arguments
    /// * `identity` - Namespace the session and progress are written to.
    pub fn end_session(&self, identity: &UserIdentity) -> Result<SessionOutcome, StatsError> {
        let session = self.active.lock().take().ok_or(StatsError::NoActiveSession)?;
        let now = self.repo.clock().now();
        let ended_at = now.max(session.started_at);

        let record = SessionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            game_type: session.game_type.clone(),
            started_at: session.started_at,
            ended_at,
            questions_answered: session.questions_answered,
            correct_answers: session.correct_answers,
            accuracy: accuracy_of(session.correct_answers, session.questions_answered),
            time_spent: ended_at - session.started_at,
            longest_streak: session.longest_streak,
            hints_used: session.hints_used,
            score: score(
                &self.config,
                &session.game_type,
                session.correct_answers,
                session.longest_streak,
                session.hints_used,
            ),
            difficulty: session.difficulty,
            age_group: session.age_group,
            synced: false,
        };
        let progress = match self.commit(identity, &record, &session, now) {
            Ok(progress) => progress,
            Err(e) => {
                log::warn!("[STATS] session for {} not recorded: {}", identity.identity_key(), e);
                *self.active.lock() = Some(session);
                return Err(e);
            }
        };

        let mut perf: PerformanceCache = self.repo.load_perf(identity);
        perf.record(&record, session.sum_response_ms);
        if let Err(e) = self.repo.save_perf(identity, &perf) {
            log::warn!("[STATS] performance cache not saved: {}", e);
        }

        let unlocked = match self.tracker {
            Some(tracker) => self
                .track_achievements(&tracker, identity, &progress, &record)
                .unwrap_or_else(|e| {
                    log::warn!("[STATS] achievements not saved: {}", e);
                    Vec::new()
                }),
            None => Vec::new(),
        };

        log::info!(
            "[STATS] {} session {} for {}: {}/{} correct, score {}",
            record.game_type,
            record.id,
            identity.identity_key(),
            record.correct_answers,
            record.questions_answered,
            record.score
        );

        self.bus.emit(CoreEvent::ProgressUpdated {
            identity: identity.clone(),
            progress: progress.clone(),
            session: record.clone(),
        });

        Ok(SessionOutcome {
            record,
            progress,
            unlocked,
        })
    }

    /// Stores the record and folds it into progress. Either both land or
    /// neither does.
    fn commit(
        &self,
        identity: &UserIdentity,
        record: &SessionRecord,
        session: &ActiveSession,
        now: u64,
    ) -> Result<Progress, StatsError> {
        self.repo.append_session(identity, record)?;

        let mut progress = self.repo.load_progress(identity);
        progress.games_played += 1;
        progress.questions_answered += record.questions_answered;
        progress.correct_answers += record.correct_answers;
        progress.time_spent += record.time_spent;
        progress.current_streak = session.current_streak;
        progress.best_streak = progress.best_streak.max(record.longest_streak);
        progress.xp += record.score;
        if let Some(steps) = progress.xp.checked_div(self.config.xp_per_level) {
            progress.level = progress.level.max(1 + steps);
        }
        progress.last_played = Some(record.ended_at);
        progress.updated_at = stamp_after(now, progress.updated_at);

        match self.repo.save_progress(identity, &progress) {
            Ok(progress) => Ok(progress),
            Err(e) => {
                if let Err(undo) = self.repo.remove_session(identity, &record.id) {
                    log::error!("[STATS] could not drop session {} after failed progress write: {}", record.id, undo);
                }
                Err(e.into())
            }
        }
    }

    fn track_achievements(
        &self,
        tracker: &AchievementTracker,
        identity: &UserIdentity,
        progress: &Progress,
        record: &SessionRecord,
    ) -> Result<Vec<Achievement>, StatsError> {
        let existing = self.repo.list_achievements(identity);
        let mut unlocked = Vec::new();
        for earned in tracker.evaluate(progress, record, &existing) {
            let was_unlocked = existing.iter().any(|a| a.id == earned.id && a.is_unlocked());
            let stored = self.repo.upsert_achievement(identity, earned)?;
            if stored.is_unlocked() && !was_unlocked {
                log::info!("[STATS] achievement unlocked: {}", stored.id);
                unlocked.push(stored);
            }
        }
        Ok(unlocked)
    }
}
