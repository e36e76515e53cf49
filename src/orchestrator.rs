use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::context::{RunContext, RunLog};
use crate::error::{Result, ForgeError};
use crate::media::{ExecutionOutcome, MediaCommand, MediaCommandBuilder, ProcessRunner};
use crate::output::Artifact;
use crate::pipeline::{self, FormatPlan, Strategy};
use crate::request::ProcessingRequest;
use crate::upload::Upload;

/// Drives the per-format strategy chains for one request.
///
/// Formats are attempted sequentially in plan order. Within a format every
/// strategy targets the same output path, so attempts never overlap.
pub struct Orchestrator {
    runner: Arc<dyn ProcessRunner>,
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);
        Self {
            runner,
            config,
            command_builder,
        }
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// Run every requested format and collect usable artifacts in attempt
    /// order. Fails with `NoOutputs` when nothing could be produced.
    pub async fn process(
        &self,
        ctx: &RunContext,
        upload: &Upload,
        request: &ProcessingRequest,
    ) -> Result<Vec<Artifact>> {
        let log = &ctx.log;
        let plans = pipeline::plan(upload.kind, request, ctx.path(), &upload.stem());

        info!(
            "Processing {} as {:?}: {} format(s) planned",
            upload.path.display(),
            upload.kind,
            plans.len()
        );
        log.line(format!(
            "parameters: height={} fps={} sim={:.3} blend={:.3} threshold={:.3} preset={:?} crf={} speed={:?} twopass={}",
            request.target_height,
            request.fps,
            request.similarity,
            request.blend,
            request.white_threshold,
            request.preset,
            request.crf,
            request.speed,
            request.two_pass
        ));

        let mut artifacts = Vec::new();
        for plan in &plans {
            if self.run_plan(ctx, upload, request, plan).await {
                artifacts.push(Artifact::new(plan.format, plan.output.clone()));
            }
        }

        if artifacts.is_empty() {
            log.line("ERROR: no output format succeeded; relax the thresholds and retry");
            return Err(ForgeError::NoOutputs);
        }

        Ok(artifacts)
    }

    /// Walk one format's chain; true once a strategy yields a usable file
    async fn run_plan(&self, ctx: &RunContext, upload: &Upload, request: &ProcessingRequest, plan: &FormatPlan) -> bool {
        let log = &ctx.log;
        let slug = plan.format.slug();

        for (index, strategy) in plan.strategies.iter().copied().enumerate() {
            if index > 0 {
                log.line(format!(
                    "[{}] {} failed; falling back to {}",
                    slug,
                    plan.strategies[index - 1].label(),
                    strategy.label()
                ));
            }

            match self.attempt(ctx, upload, request, plan, strategy).await {
                Ok(()) => {
                    log.line(format!("[{}] succeeded with {}", slug, strategy.label()));
                    return true;
                }
                Err(reason) => {
                    warn!("{} via {} failed: {}", slug, strategy.label(), reason);
                    log.line(format!("[{}] {} error: {}", slug, strategy.label(), reason));
                }
            }
        }

        log.line(format!("[{}] failed: no strategy left", slug));
        false
    }

    /// One strategy attempt: optional first pass, final encode, artifact check
    async fn attempt(
        &self,
        ctx: &RunContext,
        upload: &Upload,
        request: &ProcessingRequest,
        plan: &FormatPlan,
        strategy: Strategy,
    ) -> std::result::Result<(), String> {
        let log = &ctx.log;
        let deadline = self.config.deadline_for(upload.kind, &plan.output);
        let graph = strategy.filter_graph(request);
        let codec_args = strategy.codec_args(request);
        let description = format!("{} via {}", plan.format.slug(), strategy.label());

        log.line(format!("[{}] trying {}", plan.format.slug(), strategy.label()));
        log.line(format!("filter: {}", graph.expression()));

        let base = self
            .command_builder
            .encode(description, &upload.path)
            .filter_graph(&graph)
            .args(codec_args);

        let two_pass = request.two_pass && strategy.supports_two_pass();
        if request.two_pass && !two_pass {
            log.line(format!("{} runs single-pass; two-pass skipped", strategy.label()));
        }

        let final_command = if two_pass {
            let stats = ctx.path().join(format!("{}_{}_pass", plan.format.slug(), strategy.slug()));
            let first = base.clone().no_audio().pass(1, &stats).null_output();
            self.execute(&first, deadline, log).await?;
            base.pass(2, &stats).output(&plan.output)
        } else {
            base.output(&plan.output)
        };

        self.execute(&final_command, deadline, log).await?;
        verify_artifact(&plan.output).await
    }

    async fn execute(&self, command: &MediaCommand, deadline: Duration, log: &RunLog) -> std::result::Result<(), String> {
        debug!("Executing {} (deadline {}s)", command.description, deadline.as_secs());
        let outcome = self.runner.run(command, deadline, log).await;
        log.line(format!("outcome: {}", outcome));

        match outcome {
            ExecutionOutcome::Success(_) => Ok(()),
            failure => Err(failure.to_string()),
        }
    }
}

/// A zero exit only counts when the declared output exists and is non-empty
async fn verify_artifact(path: &Path) -> std::result::Result<(), String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(format!("{} is empty", path.display())),
        Err(_) => Err(format!("{} was not produced", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::media::MockProcessRunner;
    use crate::pipeline::OutputFormat;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn request(pairs: &[(&str, &str)]) -> ProcessingRequest {
        let fields: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ProcessingRequest::from_fields(&fields, &Config::default().defaults)
    }

    fn codec_of(command: &MediaCommand) -> String {
        let pos = command.args.iter().position(|a| a == "-c:v").unwrap();
        command.args[pos + 1].clone()
    }

    fn graph_of(command: &MediaCommand) -> String {
        let pos = command.args.iter().position(|a| a == "-filter_complex").unwrap();
        command.args[pos + 1].clone()
    }

    /// Mock runner whose outcome is decided per command; successful final
    /// encodes write a small file to the declared output.
    fn scripted<F>(decide: F) -> (MockProcessRunner, Arc<Mutex<Vec<MediaCommand>>>)
    where
        F: Fn(&MediaCommand) -> bool + Send + Sync + 'static,
    {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(move |command, _deadline, _log| {
            seen.lock().unwrap().push(command.clone());
            if !decide(command) {
                return ExecutionOutcome::ToolFailure("encoder exploded".to_string());
            }
            match &command.output_path {
                Some(path) => {
                    std::fs::write(path, b"artifact").unwrap();
                    ExecutionOutcome::Success(path.clone())
                }
                None => ExecutionOutcome::Success(PathBuf::from("-")),
            }
        });
        (runner, calls)
    }

    fn orchestrator(runner: MockProcessRunner) -> Orchestrator {
        Orchestrator::new(Arc::new(runner), Config::default().media)
    }

    fn video_upload(ctx: &RunContext) -> Upload {
        let upload = Upload::prepare(ctx.path(), "clip.mp4");
        std::fs::write(&upload.path, b"input").unwrap();
        upload
    }

    fn log_text(ctx: &RunContext) -> String {
        std::fs::read_to_string(ctx.log_path()).unwrap()
    }

    #[tokio::test]
    async fn test_color_key_success_yields_single_webp() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let (runner, calls) = scripted(|_| true);

        let artifacts = orchestrator(runner)
            .process(&ctx, &upload, &request(&[("outWebp", "true")]))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].format, OutputFormat::TransparentWebp);
        assert_eq!(artifacts[0].path, ctx.path().join("clip_transparent.webp"));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(graph_of(&calls[0]).contains("colorkey=white"));
    }

    #[tokio::test]
    async fn test_luma_key_runs_once_after_color_key_failure() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let (runner, calls) = scripted(|cmd| !graph_of(cmd).contains("colorkey"));

        let artifacts = orchestrator(runner)
            .process(&ctx, &upload, &request(&[("outWebp", "1"), ("lumaFallback", "1")]))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].path, ctx.path().join("clip_transparent.webp"));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(graph_of(&calls[1]).contains("alphamerge"));
        assert!(!graph_of(&calls[1]).contains("colorkey"));
        assert_eq!(calls[0].output_path, calls[1].output_path);

        let log = log_text(&ctx);
        assert!(log.contains("[transparent-webp] trying color key"));
        assert!(log.contains("falling back to luma key"));
        assert!(log.contains("[transparent-webp] succeeded with luma key"));
    }

    #[tokio::test]
    async fn test_no_luma_attempt_when_disabled() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let (runner, calls) = scripted(|_| false);

        let result = orchestrator(runner)
            .process(&ctx, &upload, &request(&[("lumaFallback", "0")]))
            .await;

        assert!(matches!(result, Err(ForgeError::NoOutputs)));
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(log_text(&ctx).contains("no output format succeeded"));
    }

    #[tokio::test]
    async fn test_timeout_triggers_fallback_like_failure() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(move |command, deadline, _| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 1 {
                return ExecutionOutcome::TimedOut(deadline);
            }
            let path = command.output_path.clone().unwrap();
            std::fs::write(&path, b"webp").unwrap();
            ExecutionOutcome::Success(path)
        });

        let artifacts = orchestrator(runner).process(&ctx, &upload, &request(&[])).await.unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(*calls.lock().unwrap(), 2);
        assert!(log_text(&ctx).contains("outcome: timed out after 1800s"));
    }

    #[tokio::test]
    async fn test_empty_output_counts_as_failure() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(2).returning(|command, _, _| {
            let path = command.output_path.clone().unwrap();
            std::fs::write(&path, b"").unwrap();
            ExecutionOutcome::Success(path)
        });

        let result = orchestrator(runner).process(&ctx, &upload, &request(&[])).await;

        assert!(matches!(result, Err(ForgeError::NoOutputs)));
        assert!(log_text(&ctx).contains("is empty"));
    }

    #[tokio::test]
    async fn test_webm_trial_loop_stops_at_first_success() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let (runner, calls) = scripted(|cmd| codec_of(cmd) != "libsvtav1");

        let artifacts = orchestrator(runner)
            .process(&ctx, &upload, &request(&[("outWebp", "0"), ("outAv1", "1")]))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].format, OutputFormat::Webm);
        let codecs: Vec<String> = calls.lock().unwrap().iter().map(codec_of).collect();
        assert_eq!(codecs, vec!["libsvtav1", "libaom-av1"]);
    }

    #[tokio::test]
    async fn test_exhausted_trial_loop_drops_format_only() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let (runner, calls) = scripted(|cmd| codec_of(cmd) == "libx264");

        let artifacts = orchestrator(runner)
            .process(&ctx, &upload, &request(&[("outWebp", "0"), ("outAv1", "1"), ("outH264", "1")]))
            .await
            .unwrap();

        let formats: Vec<OutputFormat> = artifacts.iter().map(|a| a.format).collect();
        assert_eq!(formats, vec![OutputFormat::Mp4]);
        let codecs: Vec<String> = calls.lock().unwrap().iter().map(codec_of).collect();
        assert_eq!(codecs, vec!["libsvtav1", "libaom-av1", "libvpx-vp9", "libx264"]);
    }

    #[tokio::test]
    async fn test_gif_outputs_in_declared_order() {
        let ctx = RunContext::new().unwrap();
        let upload = Upload::prepare(ctx.path(), "loop.gif");
        std::fs::write(&upload.path, b"GIF89a").unwrap();
        let (runner, _) = scripted(|_| true);

        let artifacts = orchestrator(runner)
            .process(&ctx, &upload, &request(&[("outGif", "1"), ("outWebp", "1"), ("outH264", "1")]))
            .await
            .unwrap();

        let formats: Vec<OutputFormat> = artifacts.iter().map(|a| a.format).collect();
        assert_eq!(formats, vec![OutputFormat::OptimizedWebp, OutputFormat::CompressedGif]);
    }

    #[tokio::test]
    async fn test_gif_input_uses_short_deadline() {
        let ctx = RunContext::new().unwrap();
        let upload = Upload::prepare(ctx.path(), "loop.gif");
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|_, deadline, _| *deadline == Duration::from_secs(300))
            .times(2)
            .returning(|_, _, _| ExecutionOutcome::ToolFailure("bad gif".to_string()));

        let result = orchestrator(runner).process(&ctx, &upload, &request(&[])).await;
        assert!(matches!(result, Err(ForgeError::NoOutputs)));
    }

    #[tokio::test]
    async fn test_two_pass_runs_first_pass_per_attempt() {
        let ctx = RunContext::new().unwrap();
        let upload = video_upload(&ctx);
        let (runner, calls) = scripted(|cmd| codec_of(cmd) != "libsvtav1");

        orchestrator(runner)
            .process(&ctx, &upload, &request(&[("outWebp", "0"), ("outAv1", "1"), ("twopass", "1")]))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(codec_of(&calls[0]), "libsvtav1");
        assert!(!calls[0].args.contains(&"-pass".to_string()));
        assert!(calls[1].output_path.is_none());
        assert!(calls[1].args.windows(2).any(|w| w[0] == "-pass" && w[1] == "1"));
        assert!(calls[2].args.windows(2).any(|w| w[0] == "-pass" && w[1] == "2"));
        assert_eq!(calls[2].output_path, Some(ctx.path().join("clip_clean.webm")));
    }
}
