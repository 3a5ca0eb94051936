//! The command/response exchange on an open channel.
//!
//! One exchange is: send the command line, answer each follow-up once its
//! sub-prompt shows up, read until the shell prompt comes back, then strip
//! the echo and prompt and classify what is left. Every read has its own
//! deadline; whatever was captured travels with the error when one expires.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};
use tokio::time::Instant;

use super::request::CommandRequest;
use super::response::{CommandResponse, Failure, FailureKind};
use crate::channel::{PromptMatcher, PromptPattern, PtyChannel};
use crate::error::{ChannelError, CommandStep, DriverError, Error, Result};
use crate::platform::{PlatformDefinition, ShellMode};
use crate::transport::ShellIo;

/// Command label used in errors raised by a bare probe.
pub(crate) const PROBE_LABEL: &str = "<probe>";

/// Run `request` on `channel`. The caller has already put the shell in the
/// right mode.
pub(crate) async fn execute<S: ShellIo>(
    channel: &mut PtyChannel<S>,
    platform: &PlatformDefinition,
    request: &CommandRequest,
    default_timeout: Duration,
) -> Result<CommandResponse> {
    let start = Instant::now();
    let prompts = &platform.prompts;
    let mut transcript = String::new();

    debug!("sending command: {}", request.display());
    channel.send_line(&request.command).await?;

    for (i, follow_up) in request.follow_ups.iter().enumerate() {
        let timeout = follow_up.timeout.or(request.timeout).unwrap_or(default_timeout);
        let expect = &follow_up.expect;

        let data = channel
            .read_until(
                |buffer| {
                    let tail = buffer.tail().1;
                    expect.is_match(tail) || prompts.is_match(tail)
                },
                timeout,
            )
            .await
            .map_err(|e| step_error(e, request, CommandStep::FollowUp(i), &transcript))?;
        transcript.push_str(&String::from_utf8_lossy(&data));

        if !expect.is_match(&data) {
            // The shell gave its prompt back before asking for input
            let output = normalize(&transcript, request);
            debug!(
                "follow-up #{} of '{}' pre-empted by shell prompt",
                i + 1,
                request.display()
            );
            return Err(DriverError::CommandFailed {
                command: request.display().to_string(),
                message: format!("shell prompt returned before sub-prompt {}", expect),
                output,
                elapsed: start.elapsed(),
            }
            .into());
        }

        debug!("answering sub-prompt {} with {}", expect, follow_up.display_input());
        if follow_up.newline {
            channel.send_line(&follow_up.input).await?;
        } else {
            channel.send_raw(follow_up.input.as_bytes()).await?;
        }
    }

    let timeout = request.timeout.unwrap_or(default_timeout);
    let data = channel
        .read_until(|buffer| prompts.is_match(buffer.tail().1), timeout)
        .await
        .map_err(|e| step_error(e, request, CommandStep::Prompt, &transcript))?;

    let (mode, prompt, body) = split_prompt(prompts, &data);
    transcript.push_str(&body);

    let output = normalize(&transcript, request);
    let failure = classify(platform, request, &output);
    let elapsed = start.elapsed();

    match &failure {
        Some(f) => debug!("'{}' failed after {:?}: {}", request.display(), elapsed, f.message),
        None => trace!("'{}' completed in {:?}", request.display(), elapsed),
    }

    Ok(CommandResponse::new(
        request.display(),
        output,
        prompt,
        mode,
        elapsed,
        failure,
    ))
}

/// Send a bare line ending and read the prompt it produces.
pub(crate) async fn probe<S: ShellIo>(
    channel: &mut PtyChannel<S>,
    prompts: &PromptMatcher,
    timeout: Duration,
) -> Result<(ShellMode, String)> {
    channel.send_line("").await?;
    read_prompt(channel, prompts, timeout).await
}

/// Send the interrupt sequence and wait for the shell prompt.
pub(crate) async fn interrupt<S: ShellIo>(
    channel: &mut PtyChannel<S>,
    platform: &PlatformDefinition,
    timeout: Duration,
) -> Result<(ShellMode, String)> {
    channel.send_raw(&platform.interrupt).await?;
    read_prompt(channel, &platform.prompts, timeout).await
}

/// Read until any shell prompt and classify it.
pub(crate) async fn read_prompt<S: ShellIo>(
    channel: &mut PtyChannel<S>,
    prompts: &PromptMatcher,
    timeout: Duration,
) -> Result<(ShellMode, String)> {
    let data = channel
        .read_until(|buffer| prompts.is_match(buffer.tail().1), timeout)
        .await
        .map_err(|e| match e {
            Error::Channel(ChannelError::ReadTimeout { waited, partial }) => {
                DriverError::CommandTimeout {
                    command: PROBE_LABEL.to_string(),
                    step: CommandStep::Probe,
                    waited,
                    partial,
                }
                .into()
            }
            other => other,
        })?;
    let (mode, prompt, _) = split_prompt(prompts, &data);
    Ok((mode, prompt))
}

/// Split a buffer that ends in a prompt into mode, prompt text and the
/// output before it.
pub(crate) fn split_prompt(prompts: &PromptMatcher, data: &Bytes) -> (ShellMode, String, String) {
    match prompts.find(data) {
        Some(m) => (
            m.mode,
            m.text,
            String::from_utf8_lossy(&data[..m.start]).into_owned(),
        ),
        None => (
            ShellMode::Unknown,
            String::new(),
            String::from_utf8_lossy(data).into_owned(),
        ),
    }
}

/// Attach the step and the full transcript to a read failure.
fn step_error(err: Error, request: &CommandRequest, step: CommandStep, transcript: &str) -> Error {
    match err {
        Error::Channel(ChannelError::ReadTimeout { waited, partial }) => DriverError::CommandTimeout {
            command: request.display().to_string(),
            step,
            waited,
            partial: request.redact(&format!("{}{}", transcript, partial)),
        }
        .into(),
        Error::Channel(ChannelError::ConnectionLost { partial }) => ChannelError::ConnectionLost {
            partial: request.redact(&format!("{}{}", transcript, partial)),
        }
        .into(),
        other => other,
    }
}

/// Remove carriage returns, the echoed command and surrounding blank
/// lines, and any hidden input.
fn normalize(raw: &str, request: &CommandRequest) -> String {
    let text = raw.replace('\r', "");
    let text = text.trim_start_matches('\n');
    let command = request.command.trim();

    let body = match text.split_once('\n') {
        Some((first, rest)) if first.trim_end().ends_with(command) => rest,
        None if text.trim_end().ends_with(command) => "",
        _ => text,
    };

    request.redact(body.trim_matches(|c: char| c == '\n' || c == ' '))
}

fn classify(platform: &PlatformDefinition, request: &CommandRequest, output: &str) -> Option<Failure> {
    if let Some(line) = platform.detect_failure(output, &request.failure_markers) {
        return Some(Failure {
            kind: FailureKind::ErrorMarker,
            message: line.to_string(),
        });
    }
    request.check.violation(output).map(|message| Failure {
        kind: FailureKind::UnexpectedOutput,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PtyConfig;
    use crate::driver::OutputCheck;
    use crate::error::ErrorKind;
    use crate::platform::vendors::gaia;
    use crate::transport::fake::ChunkedShell;

    fn channel(chunks: &[&str]) -> PtyChannel<ChunkedShell> {
        let chunks = chunks.iter().map(|c| c.as_bytes().to_vec()).collect();
        PtyChannel::new(ChunkedShell::new(chunks).stall_when_empty(), PtyConfig::default())
    }

    fn platform() -> PlatformDefinition {
        gaia::platform().unwrap()
    }

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_plain_command() {
        let mut ch = channel(&["show hostname\r\n", "gw\r\n", "gw> "]);
        let request = CommandRequest::query("show hostname");
        let response = execute(&mut ch, &platform(), &request, T).await.unwrap();

        assert!(response.success);
        assert_eq!(response.output, "gw");
        assert_eq!(response.prompt, "gw>");
        assert_eq!(response.mode, ShellMode::Restricted);
    }

    #[tokio::test]
    async fn test_password_follow_ups_hide_secret() {
        // PTY echoes nothing for hidden input, but a misbehaving one might
        let mut ch = channel(&[
            "set expert-password\r\n",
            "Enter new expert password:",
            "NewSecret1!\r\n",
            "Retype new expert password:",
            "\r\n",
            "gw> ",
        ]);
        let request = CommandRequest::new("set expert-password")
            .hidden_follow_up("password:", "NewSecret1!")
            .hidden_follow_up("password:", "NewSecret1!");

        let response = execute(&mut ch, &platform(), &request, T).await.unwrap();
        assert!(response.success);
        assert!(!response.output.contains("NewSecret1!"));
        assert!(response.output.starts_with("Enter new expert password:"));
    }

    #[tokio::test]
    async fn test_error_marker_classifies_failure() {
        let mut ch = channel(&["show foo\r\nCLINFR0329  Invalid command:'show foo'.\r\ngw> "]);
        let request = CommandRequest::query("show foo");
        let response = execute(&mut ch, &platform(), &request, T).await.unwrap();

        assert!(!response.success);
        let failure = response.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::ErrorMarker);
        assert_eq!(failure.message, "CLINFR0329  Invalid command:'show foo'.");
    }

    #[tokio::test]
    async fn test_output_check() {
        let mut ch = channel(&["show version all\r\n\r\ngw> "]);
        let request = CommandRequest::query("show version all").expect_output(OutputCheck::NonEmpty);
        let response = execute(&mut ch, &platform(), &request, T).await.unwrap();

        assert!(!response.success);
        assert_eq!(response.failure.unwrap().kind, FailureKind::UnexpectedOutput);
    }

    #[tokio::test]
    async fn test_prompt_before_sub_prompt_is_command_failure() {
        let mut ch = channel(&[
            "expert\r\nExpert password has not been defined. To set expert password, use the command \"set expert-password\".\r\ngw> ",
        ]);
        let request = CommandRequest::new("expert").hidden_follow_up("password:", "secret");
        let err = execute(&mut ch, &platform(), &request, T).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Command);
        assert!(err.partial_output().unwrap().contains("has not been defined"));
        assert!(err.elapsed().is_some());
    }

    #[tokio::test]
    async fn test_markup_line_does_not_end_expert_output() {
        let mut ch = channel(&[
            "cat /tmp/a.xml\r\n<config>\r\n<host>gw</host>",
            "\r\n</config>\r\n[Expert@gw:0]# ",
        ]);
        let request = CommandRequest::query("cat /tmp/a.xml");
        let response = execute(&mut ch, &platform(), &request, T).await.unwrap();

        assert_eq!(response.mode, ShellMode::Privileged);
        assert_eq!(response.prompt, "[Expert@gw:0]#");
        assert_eq!(response.output, "<config>\n<host>gw</host>\n</config>");
    }

    #[tokio::test]
    async fn test_labelled_command_keeps_contents_out_of_errors() {
        let mut ch = channel(&[
            "printf '%b' 'ftw_sic_key=Vpn123456\\n' > /tmp/ftw.conf\r\n",
            "bash: /tmp/ftw.conf: Permission denied\r\n[Expert@gw:0]# ",
        ]);
        let request = CommandRequest::new(r"printf '%b' 'ftw_sic_key=Vpn123456\n' > /tmp/ftw.conf")
            .label("printf ... > /tmp/ftw.conf (21 bytes)");
        let response = execute(&mut ch, &platform(), &request, T).await.unwrap();
        assert_eq!(response.command, "printf ... > /tmp/ftw.conf (21 bytes)");

        let err = response.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Command);
        assert!(!err.to_string().contains("Vpn123456"));
        assert!(!err.partial_output().unwrap().contains("Vpn123456"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_timeout_carries_transcript() {
        let mut ch = channel(&[
            "set expert-password\r\n",
            "Enter new expert password:",
            "\r\n",
        ]);
        let request = CommandRequest::new("set expert-password")
            .hidden_follow_up("password:", "NewSecret1!")
            .hidden_follow_up("password:", "NewSecret1!");

        let err = execute(&mut ch, &platform(), &request, T).await.unwrap_err();
        match err {
            Error::Driver(DriverError::CommandTimeout { step, partial, .. }) => {
                assert_eq!(step, CommandStep::FollowUp(1));
                assert!(partial.contains("Enter new expert password:"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_lost_mid_command() {
        let chunks = vec![b"show version all\r\nProduct ver".to_vec()];
        let mut ch = PtyChannel::new(ChunkedShell::new(chunks), PtyConfig::default());
        let request = CommandRequest::query("show version all");
        let err = execute(&mut ch, &platform(), &request, T).await.unwrap_err();

        assert!(err.is_connection_lost());
        assert!(err.partial_output().unwrap().contains("Product ver"));
    }

    #[tokio::test]
    async fn test_probe() {
        let mut ch = channel(&["\r\n[Expert@gw:0]# "]);
        let (mode, prompt) = probe(&mut ch, &PromptMatcher::default(), T).await.unwrap();
        assert_eq!(mode, ShellMode::Privileged);
        assert_eq!(prompt, "[Expert@gw:0]#");
    }

    #[test]
    fn test_normalize_strips_echo() {
        let request = CommandRequest::new("hostname");
        assert_eq!(normalize("hostname\r\ngw\r\n", &request), "gw");
        assert_eq!(normalize("\r\nhostname\r\n", &request), "");
        assert_eq!(normalize("no echo here\r\n", &request), "no echo here");
    }
}
