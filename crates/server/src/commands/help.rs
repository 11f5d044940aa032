use async_trait::async_trait;
use relay_webex::cards::{CardBuilder, CardMessage};
use relay_webex::commands::{CommandHandler, CommandReply, HelpEntry, Invocation};
use relay_webex::responder::ReplyContent;

pub struct HelpCommand {
    entries: Vec<HelpEntry>,
}

impl HelpCommand {
    pub fn new(entries: Vec<HelpEntry>) -> Self {
        Self { entries }
    }

    fn render(&self) -> CardMessage {
        let lines: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                if entry.help_text.is_empty() {
                    format!("- **{}**", entry.keyword)
                } else {
                    format!("- **{}**: {}", entry.keyword, entry.help_text)
                }
            })
            .collect();
        let listing = lines.join("\n");

        CardBuilder::new(format!("Here is what I can do:\n\n{listing}"))
            .heading("Here is what I can do")
            .text(listing)
            .build()
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn execute(&self, _invocation: &Invocation<'_>) -> CommandReply {
        CommandReply::completed(ReplyContent::card(self.render()))
    }
}
