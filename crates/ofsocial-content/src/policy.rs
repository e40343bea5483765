//! Bounded generate → clean → accept loop with fallback text.

use std::sync::Arc;

use tracing::{debug, warn};

use ofsocial_core::{ContentKind, GenerationParams, Persona, truncate_chars};
use ofsocial_runtime::{ResourceLease, ResourceManager};

use crate::prompt::{comment_prompt, post_prompt};
use crate::sanitizer::ContentSanitizer;

/// Fallback comment used when no attempt produced usable text.
pub const COMMENT_FALLBACK: &str = "Interesting post!";

/// Tunables for [`GenerationPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Generation attempts per request, including the first.
    pub max_attempts: usize,
    pub post_params: GenerationParams,
    pub comment_params: GenerationParams,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            post_params: GenerationParams::for_kind(ContentKind::Post),
            comment_params: GenerationParams::for_kind(ContentKind::Comment),
        }
    }
}

/// Where the attempts of one request run.
enum Target<'a> {
    /// Acquire the resource afresh for every attempt.
    Resource(usize),
    /// Run every attempt under a lease the caller already holds.
    Lease(&'a mut ResourceLease),
}

impl Target<'_> {
    fn index(&self) -> usize {
        match self {
            Target::Resource(index) => *index,
            Target::Lease(lease) => lease.index(),
        }
    }
}

/// Produces posts and comments that are never empty.
///
/// Generation failures and unacceptable output are absorbed here: each one
/// consumes an attempt, and once attempts run out the policy degrades to the
/// last cleaned output or to fixed fallback text.
pub struct GenerationPolicy {
    resources: Arc<ResourceManager>,
    sanitizer: ContentSanitizer,
    config: PolicyConfig,
}

impl GenerationPolicy {
    pub fn new(resources: Arc<ResourceManager>, sanitizer: ContentSanitizer) -> Self {
        Self::with_config(resources, sanitizer, PolicyConfig::default())
    }

    pub fn with_config(
        resources: Arc<ResourceManager>,
        sanitizer: ContentSanitizer,
        config: PolicyConfig,
    ) -> Self {
        Self {
            resources,
            sanitizer,
            config,
        }
    }

    pub fn resource_count(&self) -> usize {
        self.resources.resource_count()
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Generate a post about `topic` on resource `resource_index`.
    pub async fn generate_post(&self, topic: &str, resource_index: usize) -> String {
        let prompt = post_prompt(topic);
        self.generate_accepted(
            ContentKind::Post,
            &prompt,
            &self.config.post_params,
            Target::Resource(resource_index),
            format!("I've been thinking about {topic} lately..."),
        )
        .await
    }

    /// Generate `persona`'s comment on `post_content` on resource `resource_index`.
    pub async fn generate_comment(
        &self,
        post_content: &str,
        persona: &Persona,
        resource_index: usize,
    ) -> String {
        let prompt = comment_prompt(post_content, persona);
        self.generate_accepted(
            ContentKind::Comment,
            &prompt,
            &self.config.comment_params,
            Target::Resource(resource_index),
            COMMENT_FALLBACK.to_string(),
        )
        .await
    }

    /// Like [`generate_comment`](Self::generate_comment), with every attempt
    /// running under `lease`.
    pub async fn generate_comment_on(
        &self,
        lease: &mut ResourceLease,
        post_content: &str,
        persona: &Persona,
    ) -> String {
        let prompt = comment_prompt(post_content, persona);
        self.generate_accepted(
            ContentKind::Comment,
            &prompt,
            &self.config.comment_params,
            Target::Lease(lease),
            COMMENT_FALLBACK.to_string(),
        )
        .await
    }

    async fn generate_accepted(
        &self,
        kind: ContentKind,
        prompt: &str,
        params: &GenerationParams,
        mut target: Target<'_>,
        fallback: String,
    ) -> String {
        let resource_index = target.index();
        let mut last_cleaned = String::new();

        for attempt in 1..=self.config.max_attempts {
            let result = match &mut target {
                Target::Resource(index) => {
                    self.resources
                        .acquire_and_generate(*index, prompt, params)
                        .await
                }
                Target::Lease(lease) => lease.generate(prompt, params).await,
            };
            let raw = match result {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        kind = kind.label(),
                        resource_index,
                        attempt,
                        error = %e,
                        "generation attempt failed"
                    );
                    continue;
                }
            };

            let cleaned = self.sanitizer.clean(&raw);
            // Accept first, truncate after.
            if self
                .sanitizer
                .is_acceptable(&cleaned, kind, kind.min_length())
            {
                debug!(kind = kind.label(), resource_index, attempt, "output accepted");
                return truncate_chars(&cleaned, kind.max_length());
            }

            warn!(
                kind = kind.label(),
                resource_index,
                attempt,
                "artifact detected in output, retrying"
            );
            last_cleaned = cleaned;
        }

        if last_cleaned.is_empty() {
            debug!(kind = kind.label(), resource_index, "using fallback text");
            fallback
        } else {
            truncate_chars(&last_cleaned, kind.max_length())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ofsocial_runtime::TextGenerator;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records the prompts it was given.
    /// Once the script is exhausted every call fails.
    struct ScriptedGenerator {
        replies: VecDeque<Result<String, String>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &mut self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
                None => Err(anyhow::anyhow!("script exhausted")),
            }
        }
    }

    fn policy_with(
        scripts: Vec<Vec<Result<String, String>>>,
    ) -> (GenerationPolicy, Vec<Arc<Mutex<Vec<String>>>>) {
        let mut logs = Vec::new();
        let mut generators: Vec<(String, Box<dyn TextGenerator>)> = Vec::new();
        for (i, script) in scripts.into_iter().enumerate() {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            generators.push((
                format!("cuda:{i}"),
                Box::new(ScriptedGenerator {
                    replies: script.into(),
                    prompts: prompts.clone(),
                }),
            ));
            logs.push(prompts);
        }
        let manager = Arc::new(ResourceManager::new(generators).unwrap());
        let policy = GenerationPolicy::new(manager, ContentSanitizer::new().unwrap());
        (policy, logs)
    }

    fn ok(text: &str) -> Result<String, String> {
        Ok(text.to_string())
    }

    fn persona() -> Persona {
        Persona::new("Sam Casual", "Friendly, conversational")
    }

    #[tokio::test]
    async fn accepted_output_is_returned_after_one_call() {
        let (policy, logs) = policy_with(vec![vec![ok(
            "Sure! No hashtags. I love hiking in the mountains every weekend.",
        )]]);
        let comment = policy.generate_comment("Hiking?", &persona(), 0).await;
        assert_eq!(comment, "I love hiking in the mountains every weekend.");
        assert_eq!(logs[0].lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unacceptable_output_is_retried() {
        let (policy, logs) = policy_with(vec![vec![
            ok("Too short!"),
            ok("That trail looks amazing, which park is it?"),
        ]]);
        let comment = policy.generate_comment("New trail", &persona(), 0).await;
        assert_eq!(comment, "That trail looks amazing, which park is it.");
        assert_eq!(logs[0].lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_cleaned_attempt() {
        let (policy, logs) = policy_with(vec![vec![ok("Nope!"), ok("Too short!")]]);
        let comment = policy.generate_comment("Anything", &persona(), 0).await;
        assert_eq!(comment, "Too short!");
        assert_eq!(logs[0].lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_cleaned_output_falls_back() {
        let (policy, _) = policy_with(vec![vec![ok("Use emojis"), ok("[smiles]")]]);
        let comment = policy.generate_comment("Anything", &persona(), 0).await;
        assert_eq!(comment, COMMENT_FALLBACK);
    }

    #[tokio::test]
    async fn always_failing_resource_yields_fallbacks() {
        let (policy, logs) = policy_with(vec![vec![]]);
        assert_eq!(
            policy.generate_comment("Anything", &persona(), 0).await,
            COMMENT_FALLBACK
        );
        assert_eq!(
            policy.generate_post("rust", 0).await,
            "I've been thinking about rust lately..."
        );
        // Every failure still consumed an attempt.
        assert_eq!(logs[0].lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failed_attempt_is_followed_by_retry() {
        let (policy, _) = policy_with(vec![vec![
            Err("device lost".to_string()),
            ok("Totally agree with this take on remote work."),
        ]]);
        let comment = policy.generate_comment("Remote work", &persona(), 0).await;
        assert_eq!(comment, "Totally agree with this take on remote work.");
    }

    #[tokio::test]
    async fn accepted_output_is_truncated() {
        let long = "a".repeat(1000);
        let (policy, _) = policy_with(vec![vec![ok(&long)]]);
        let post = policy.generate_post("letters", 0).await;
        assert_eq!(post.chars().count(), 750);
        assert!(post.chars().all(|c| c == 'a'));
    }

    #[tokio::test]
    async fn post_acceptance_uses_post_threshold() {
        // Long enough for a comment, too short for a post.
        let (policy, logs) = policy_with(vec![vec![
            ok("Great weather today"),
            ok("The farmers market downtown had the best peaches this week."),
        ]]);
        let post = policy.generate_post("markets", 0).await;
        assert_eq!(post, "The farmers market downtown had the best peaches this week.");
        assert_eq!(logs[0].lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn calls_go_to_the_requested_resource() {
        let (policy, logs) = policy_with(vec![
            vec![],
            vec![ok("Love this idea, count me in for next time.")],
        ]);
        let comment = policy.generate_comment("Picnic", &persona(), 1).await;
        assert_eq!(comment, "Love this idea, count me in for next time.");
        assert!(logs[0].lock().unwrap().is_empty());
        let prompts = logs[1].lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Sam Casual"));
        assert!(prompts[0].contains("Picnic"));
    }

    #[tokio::test]
    async fn out_of_range_resource_still_returns_text() {
        let (policy, _) = policy_with(vec![vec![]]);
        let post = policy.generate_post("", 5).await;
        assert!(!post.is_empty());
    }

    #[tokio::test]
    async fn leased_comment_retries_on_the_same_lease() {
        let (policy, logs) = policy_with(vec![
            vec![],
            vec![
                ok("Too short!"),
                ok("Count me in, that sounds like a great weekend plan."),
            ],
        ]);
        let mut lease = policy.resources().acquire(1).await.unwrap();
        let comment = policy
            .generate_comment_on(&mut lease, "Camping trip", &persona())
            .await;
        assert_eq!(comment, "Count me in, that sounds like a great weekend plan.");
        assert_eq!(logs[1].lock().unwrap().len(), 2);
        assert!(logs[0].lock().unwrap().is_empty());
    }
}
