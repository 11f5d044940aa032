use serde::Serialize;
use serde_json::{Map, Value};

pub const CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
pub const CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
pub const CARD_VERSION: &str = "1.3";

/// Submit-data field naming the handler that receives a card submission.
pub const CALLBACK_KEYWORD_FIELD: &str = "callback_keyword";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TextSize {
    Small,
    Default,
    Medium,
    Large,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TextWeight {
    Lighter,
    Default,
    Bolder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CardElement {
    TextBlock {
        text: String,
        wrap: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<TextSize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        weight: Option<TextWeight>,
    },
    #[serde(rename = "Input.Text", rename_all = "camelCase")]
    InputText {
        id: String,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        is_multiline: bool,
        is_required: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    #[serde(rename = "Input.ChoiceSet", rename_all = "camelCase")]
    InputChoiceSet {
        id: String,
        label: String,
        choices: Vec<Choice>,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        is_required: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub title: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextInput {
    id: String,
    label: String,
    placeholder: Option<String>,
    multiline: bool,
    required_message: Option<String>,
}

impl TextInput {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            placeholder: None,
            multiline: false,
            required_message: None,
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn required(mut self, error_message: impl Into<String>) -> Self {
        self.required_message = Some(error_message.into());
        self
    }

    fn into_element(self) -> CardElement {
        CardElement::InputText {
            id: self.id,
            label: self.label,
            placeholder: self.placeholder,
            is_multiline: self.multiline,
            is_required: self.required_message.is_some(),
            error_message: self.required_message,
        }
    }
}

/// A drop-down whose titles double as submitted values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceInput {
    id: String,
    label: String,
    choices: Vec<Choice>,
    placeholder: Option<String>,
    required_message: Option<String>,
}

impl ChoiceInput {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            choices: Vec::new(),
            placeholder: None,
            required_message: None,
        }
    }

    pub fn choices<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices.extend(values.into_iter().map(|value| {
            let value = value.into();
            Choice { title: value.clone(), value }
        }));
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn required(mut self, error_message: impl Into<String>) -> Self {
        self.required_message = Some(error_message.into());
        self
    }

    fn into_element(self) -> CardElement {
        CardElement::InputChoiceSet {
            id: self.id,
            label: self.label,
            choices: self.choices,
            placeholder: self.placeholder,
            is_required: self.required_message.is_some(),
            error_message: self.required_message,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CardAction {
    #[serde(rename = "Action.Submit")]
    Submit { title: String, data: Map<String, Value> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdaptiveCard {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    pub body: Vec<CardElement>,
    pub actions: Vec<CardAction>,
}

impl AdaptiveCard {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Callback keywords carried by this card's submit actions.
    pub fn callback_keywords(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                CardAction::Submit { data, .. } => {
                    data.get(CALLBACK_KEYWORD_FIELD).and_then(Value::as_str)
                }
            })
            .collect()
    }
}

/// A card plus the text shown by clients that cannot render it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardMessage {
    pub fallback_text: String,
    pub card: AdaptiveCard,
}

impl CardMessage {
    pub fn attachment(&self) -> Value {
        serde_json::json!({
            "contentType": CARD_CONTENT_TYPE,
            "content": self.card.to_value(),
        })
    }
}

pub struct CardBuilder {
    fallback_text: String,
    body: Vec<CardElement>,
    actions: Vec<CardAction>,
}

impl CardBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), body: Vec::new(), actions: Vec::new() }
    }

    pub fn heading(mut self, text: impl Into<String>) -> Self {
        self.body.push(CardElement::TextBlock {
            text: text.into(),
            wrap: true,
            size: Some(TextSize::Medium),
            weight: Some(TextWeight::Bolder),
        });
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body.push(CardElement::TextBlock {
            text: text.into(),
            wrap: true,
            size: None,
            weight: None,
        });
        self
    }

    pub fn inputs<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut InputsBuilder),
    {
        let mut builder = InputsBuilder::default();
        build(&mut builder);
        self.body.extend(builder.build());
        self
    }

    /// Submit button routed to the command registered under `callback_keyword`.
    /// Fields added through `build` travel with the submission alongside the inputs.
    pub fn submit<F>(mut self, title: impl Into<String>, callback_keyword: &str, build: F) -> Self
    where
        F: FnOnce(&mut SubmitDataBuilder),
    {
        let mut builder = SubmitDataBuilder::default();
        build(&mut builder);
        let mut data = builder.build();
        data.insert(CALLBACK_KEYWORD_FIELD.to_owned(), Value::String(callback_keyword.to_owned()));
        self.actions.push(CardAction::Submit { title: title.into(), data });
        self
    }

    pub fn build(self) -> CardMessage {
        CardMessage {
            fallback_text: self.fallback_text,
            card: AdaptiveCard {
                kind: "AdaptiveCard",
                schema: CARD_SCHEMA,
                version: CARD_VERSION,
                body: self.body,
                actions: self.actions,
            },
        }
    }
}

#[derive(Default)]
pub struct InputsBuilder {
    elements: Vec<CardElement>,
}

impl InputsBuilder {
    pub fn text(&mut self, input: TextInput) -> &mut Self {
        self.elements.push(input.into_element());
        self
    }

    pub fn choice(&mut self, input: ChoiceInput) -> &mut Self {
        self.elements.push(input.into_element());
        self
    }

    fn build(self) -> Vec<CardElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct SubmitDataBuilder {
    data: Map<String, Value>,
}

impl SubmitDataBuilder {
    pub fn field(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.data.insert(key.into(), Value::String(value.into()));
        self
    }

    fn build(self) -> Map<String, Value> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CardBuilder, CardElement, ChoiceInput, TextInput, CARD_CONTENT_TYPE};

    #[test]
    fn builder_creates_adaptive_card_with_callback() {
        let message = CardBuilder::new("Send a message to everyone")
            .heading("Organization message")
            .inputs(|inputs| {
                inputs.text(
                    TextInput::new("message", "Message")
                        .placeholder("What should everyone see?")
                        .multiline()
                        .required("A message is required"),
                );
            })
            .submit("Send", "organization_callback", |_| {})
            .build();

        assert_eq!(message.fallback_text, "Send a message to everyone");
        assert_eq!(message.card.callback_keywords(), vec!["organization_callback"]);
        assert!(matches!(
            &message.card.body[1],
            CardElement::InputText { id, is_required: true, .. } if id == "message"
        ));
    }

    #[test]
    fn card_serializes_with_platform_field_names() {
        let message = CardBuilder::new("fallback")
            .text("Hello")
            .inputs(|inputs| {
                inputs.text(TextInput::new("feedback", "Feedback").multiline());
            })
            .submit("Submit", "feedback_submit", |data| {
                data.field("request_id", "r-1");
            })
            .build();

        let attachment = message.attachment();
        assert_eq!(attachment["contentType"], CARD_CONTENT_TYPE);

        let content = &attachment["content"];
        assert_eq!(content["type"], "AdaptiveCard");
        assert_eq!(content["version"], "1.3");
        assert_eq!(content["body"][0], json!({ "type": "TextBlock", "text": "Hello", "wrap": true }));
        assert_eq!(content["body"][1]["type"], "Input.Text");
        assert_eq!(content["body"][1]["isMultiline"], true);
        assert_eq!(content["body"][1]["isRequired"], false);
        assert_eq!(
            content["actions"][0],
            json!({
                "type": "Action.Submit",
                "title": "Submit",
                "data": { "request_id": "r-1", "callback_keyword": "feedback_submit" }
            })
        );
    }

    #[test]
    fn choice_set_serializes_titles_and_values() {
        let message = CardBuilder::new("Pick one")
            .inputs(|inputs| {
                inputs.choice(
                    ChoiceInput::new("model", "Model")
                        .choices(["DMS Cisco 8851", "DMS Cisco 8861"])
                        .required("A model is required"),
                );
            })
            .build();

        let content = message.card.to_value();
        assert_eq!(content["body"][0]["type"], "Input.ChoiceSet");
        assert_eq!(content["body"][0]["isRequired"], true);
        assert_eq!(
            content["body"][0]["choices"][1],
            json!({ "title": "DMS Cisco 8861", "value": "DMS Cisco 8861" })
        );
    }
}
