pub const DESCRIPTION: &str = r#"ask-human-cli is a Slack bot that posts questions and waits for human responses using Socket Mode.

How it works:
1. Posts your question to a Slack channel
2. Waits for a human to reply in the thread
3. Returns the reply or times out

Quick start:
Start a new conversation:
   ask-human-cli ask --question "What's the deployment process?" --title "Session title"

The bot will:
- Create a new thread with your question
- Wait for a human response (default: 5 minutes)
- Display the reply with Thread TS for follow-up questions
- Post a status message to the thread

Continue in the same thread:
   ask-human-cli ask --question "Can you explain step 3 in detail?" --thread-ts "1234567890.123456"

Using --thread-ts allows you to:
- Continue conversations in the same Slack thread
- Maintain context across multiple questions
- Keep related discussions organized in one place

Configuration:
   ask-human-cli setup writes ~/.config/ask-human-cli/config.json.
   SLACK_BOT_TOKEN, SLACK_APP_TOKEN, ASK_HUMAN_CHANNEL and ASK_HUMAN_TIMEOUT
   override the file; --channel and --timeout override both.

Perfect for:
- AI agents needing human input
- Automated workflows requiring manual approval
- Multi-turn conversations with humans
- Session-based interactions

For detailed command options, run:
  ask-human-cli ask --help"#;
