//! Two-phase verdict pipeline.
//!
//! Phase 1 fuses the blacklist, the heuristic scorer and the threat-intel
//! lookup into a fast verdict. Phase 2 runs content analysis behind the
//! result cache and may only make the verdict stricter.

use crate::blocked_log::BlockedUrlLog;
use crate::cache::ResultCache;
use crate::config::Config;
use crate::content_analyzer::{Analysis, ContentAnalyzer, ContentModel, GeminiModel};
use crate::error::AssessError;
use crate::features::blacklist::BLACKLIST_REASON;
use crate::features::{hostname, BlacklistMatcher, HeuristicScorer};
use crate::notify::{notification_channel, Delivery, VerdictNotifier, VerdictSubscription};
use crate::request::parse_target_url;
use crate::threat_intel::{DisabledThreatIntel, ThreatIntel, VirusTotalClient};
use crate::verdict::{
    push_unique, ContentVerdict, DeepVerdict, FastVerdict, ThreatIntelVerdict, UnifiedVerdict,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentState {
    Start,
    FastEvaluating,
    FastSafe,
    FastUnsafe,
    DeepEvaluating,
    FinalSafe,
    FinalUnsafe,
}

/// Lifecycle of one assessment. The fused verdict can only get stricter.
#[derive(Debug, Clone)]
pub struct VerdictTracker {
    state: AssessmentState,
    verdict: UnifiedVerdict,
}

impl Default for VerdictTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VerdictTracker {
    pub fn new() -> Self {
        Self {
            state: AssessmentState::Start,
            verdict: UnifiedVerdict::default(),
        }
    }

    pub fn state(&self) -> AssessmentState {
        self.state
    }

    pub fn verdict(&self) -> &UnifiedVerdict {
        &self.verdict
    }

    pub fn into_verdict(self) -> UnifiedVerdict {
        self.verdict
    }

    pub fn begin_fast(&mut self) -> bool {
        self.transition(AssessmentState::Start, AssessmentState::FastEvaluating)
    }

    pub fn resolve_fast(&mut self, fast: &FastVerdict) -> bool {
        if self.state != AssessmentState::FastEvaluating {
            log::debug!("Ignoring fast verdict in state {:?}", self.state);
            return false;
        }
        self.verdict.escalate(fast.safe, fast.reasons.clone(), 0);
        self.state = if self.verdict.safe {
            AssessmentState::FastSafe
        } else {
            AssessmentState::FastUnsafe
        };
        true
    }

    pub fn begin_deep(&mut self) -> bool {
        match self.state {
            AssessmentState::FastSafe | AssessmentState::FastUnsafe => {
                self.state = AssessmentState::DeepEvaluating;
                true
            }
            state => {
                log::debug!("Cannot start deep phase in state {state:?}");
                false
            }
        }
    }

    pub fn resolve_deep(&mut self, deep: &DeepVerdict) -> bool {
        if self.state != AssessmentState::DeepEvaluating {
            log::debug!("Ignoring deep verdict in state {:?}", self.state);
            return false;
        }
        self.verdict.escalate(deep.safe, deep.reasons(), deep.score);
        self.state = if self.verdict.safe {
            AssessmentState::FinalSafe
        } else {
            AssessmentState::FinalUnsafe
        };
        true
    }

    fn transition(&mut self, from: AssessmentState, to: AssessmentState) -> bool {
        if self.state != from {
            log::debug!("Ignoring transition to {to:?} from {:?}", self.state);
            return false;
        }
        self.state = to;
        true
    }
}

/// Result of [`VerdictOrchestrator::assess`]: the phase-1 verdict now, the
/// fused final verdict later.
#[derive(Debug)]
pub struct Assessment {
    pub fast: FastVerdict,
    pub deep: VerdictSubscription,
}

pub struct VerdictOrchestrator {
    blacklist: BlacklistMatcher,
    heuristics: HeuristicScorer,
    threat_intel: Arc<dyn ThreatIntel>,
    content: ContentAnalyzer,
    cache: ResultCache,
    blocked_log: BlockedUrlLog,
    threat_intel_deadline: Duration,
    unsafe_score_threshold: u8,
}

impl VerdictOrchestrator {
    /// Wire up the configured providers. Opens the blocked-URL log file when
    /// one is configured, so this must run inside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let threat_intel: Arc<dyn ThreatIntel> = if config.threat_intel.enabled {
            Arc::new(
                VirusTotalClient::new(&config.threat_intel)
                    .context("Failed to build threat-intel HTTP client")?,
            )
        } else {
            log::info!("Threat-intel lookups disabled by configuration");
            Arc::new(DisabledThreatIntel)
        };
        let model = Arc::new(
            GeminiModel::new(&config.content_analysis)
                .context("Failed to build content-analysis HTTP client")?,
        );

        let blocked_log = match &config.blocked_log.path {
            Some(path) => BlockedUrlLog::to_file(path)?,
            None => BlockedUrlLog::disabled(),
        };

        Ok(Self::new(config, threat_intel, model).with_blocked_log(blocked_log))
    }

    pub fn new(
        config: &Config,
        threat_intel: Arc<dyn ThreatIntel>,
        model: Arc<dyn ContentModel>,
    ) -> Self {
        Self {
            blacklist: BlacklistMatcher::new(&config.blacklist),
            heuristics: HeuristicScorer::new(config.heuristics.clone()),
            threat_intel,
            content: ContentAnalyzer::new(model, &config.content_analysis),
            cache: ResultCache::new(config.cache.ttl()),
            blocked_log: BlockedUrlLog::disabled(),
            threat_intel_deadline: config.threat_intel.timeout(),
            unsafe_score_threshold: config.content_analysis.unsafe_score_threshold,
        }
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_blocked_log(mut self, blocked_log: BlockedUrlLog) -> Self {
        self.blocked_log = blocked_log;
        self
    }

    pub fn with_threat_intel_deadline(mut self, deadline: Duration) -> Self {
        self.threat_intel_deadline = deadline;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Flush the blocked-URL log. Call before the runtime goes away.
    pub async fn shutdown(&self) {
        self.blocked_log.close().await;
    }

    /// Phase 1 on its own.
    pub async fn fast_check(&self, raw_url: &str) -> Result<FastVerdict, AssessError> {
        let url = parse_target_url(raw_url)?;
        let verdict = self.evaluate_fast(raw_url, &url).await;
        if !verdict.safe {
            self.blocked_log.record(url.as_str(), &verdict.reasons);
        }
        Ok(verdict)
    }

    /// Phase 2 on its own, through the cache.
    pub async fn deep_analysis(
        &self,
        raw_url: &str,
        content: &str,
    ) -> Result<DeepVerdict, AssessError> {
        let url = parse_target_url(raw_url)?;
        let verdict = self.evaluate_deep(url.as_str(), content).await;
        if !verdict.safe {
            self.blocked_log.record(url.as_str(), &verdict.reasons());
        }
        Ok(verdict)
    }

    /// Run phase 1, then hand phase 2 to a background task that delivers the
    /// fused verdict through the returned subscription.
    ///
    /// Phase 2 always runs to completion and populates the cache, even when
    /// the subscription is dropped before it finishes.
    pub async fn assess(
        self: &Arc<Self>,
        raw_url: &str,
        content: String,
    ) -> Result<Assessment, AssessError> {
        let url = parse_target_url(raw_url)?;

        let mut tracker = VerdictTracker::new();
        tracker.begin_fast();
        let fast = self.evaluate_fast(raw_url, &url).await;
        tracker.resolve_fast(&fast);

        let (notifier, subscription) = notification_channel();
        let orchestrator = Arc::clone(self);
        let target = url.to_string();
        tokio::spawn(async move {
            orchestrator
                .run_deep_phase(target, content, tracker, notifier)
                .await;
        });

        Ok(Assessment {
            fast,
            deep: subscription,
        })
    }

    async fn run_deep_phase(
        &self,
        url: String,
        content: String,
        mut tracker: VerdictTracker,
        notifier: VerdictNotifier,
    ) {
        tracker.begin_deep();
        if notifier.is_abandoned() {
            log::debug!("Subscriber for {url} is gone, analyzing for the cache only");
        }
        let deep = self.evaluate_deep(&url, &content).await;
        tracker.resolve_deep(&deep);

        let verdict = tracker.into_verdict();
        if !verdict.safe {
            self.blocked_log.record(&url, &verdict.reasons);
        }
        if notifier.deliver(verdict) == Delivery::Dropped {
            log::debug!("Subscriber for {url} is gone, final verdict dropped");
        }
    }

    async fn evaluate_fast(&self, raw_url: &str, url: &Url) -> FastVerdict {
        let mut reasons = Vec::new();

        let blacklisted = hostname(url)
            .map(|host| self.blacklist.is_blacklisted(&host))
            .unwrap_or(false);
        if blacklisted {
            reasons.push(BLACKLIST_REASON.to_string());
        }

        let (heuristic, intel) = tokio::join!(
            async { self.heuristics.score(raw_url) },
            self.lookup_threat_intel(url.as_str())
        );

        for finding in heuristic.findings {
            push_unique(&mut reasons, finding.text);
        }
        if intel.flagged {
            if let Some(finding) = intel.finding {
                push_unique(&mut reasons, finding.text);
            }
        }

        let unsafe_url = blacklisted || heuristic.suspicious || intel.flagged;
        if unsafe_url {
            log::info!("Fast check flagged {url}: {}", reasons.join(" "));
        }
        FastVerdict {
            safe: !unsafe_url,
            reasons,
        }
    }

    async fn lookup_threat_intel(&self, url: &str) -> ThreatIntelVerdict {
        match tokio::time::timeout(self.threat_intel_deadline, self.threat_intel.lookup(url)).await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                log::warn!(
                    "{} lookup for {url} exceeded {:?}, treating as not flagged",
                    self.threat_intel.name(),
                    self.threat_intel_deadline
                );
                ThreatIntelVerdict::not_flagged()
            }
        }
    }

    async fn evaluate_deep(&self, url: &str, content: &str) -> DeepVerdict {
        if let Some(cached) = self.cache.get(url).await {
            return cached;
        }

        match self.content.analyze(url, content).await {
            Analysis::Completed(verdict) => {
                let decision = DeepVerdict::from_content(verdict, self.unsafe_score_threshold);
                self.cache.put(url, decision.clone()).await;
                decision
            }
            Analysis::Failed => {
                log::debug!("Content analysis of {url} failed, result not cached");
                DeepVerdict::from_content(ContentVerdict::empty(), self.unsafe_score_threshold)
            }
        }
    }
}
