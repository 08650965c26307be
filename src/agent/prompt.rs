//! Prompt templates for the agent.

use crate::llm::ChatMessage;
use crate::tools::ToolRegistry;

/// Generation stops here so the model never writes its own observations.
pub const STOP_SEQUENCE: &str = "Observation:";

const DEFAULT_PREFIX: &str = r#"You are an AI JavaScript/Node.js assistant.
- Follow the user's instructions carefully and to the letter.
- Keep prose to a minimum.
- You are building an Express server that handles a REST API: {method} requests on route '{route}'.
- Always use `import` to import packages.
- Any code you put in an action must be JSON escaped.
- You have access to the following tools:"#;

const DEFAULT_FORMAT_INSTRUCTIONS: &str = r#"You use a tool by writing a JSON blob with an `action` key (the name of the tool) and an `action_input` key (the input to the tool).
The only values allowed in the "action" field are: {tool_names}.
The blob must contain a SINGLE action, never a list of actions. A valid blob looks like this:
```
{
  "action": $TOOL_NAME,
  "action_input": $INPUT
}
```
Always use the following format:

Instructions: the instructions you must implement
Thought: what you should do next
Action:
```
$JSON_BLOB
```
Observation: the result of the action
... (Thought/Action/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final code that satisfies all the instructions. The final answer must be only the code."#;

const DEFAULT_SUFFIX: &str = "Begin! Never use tools you don't have access to, and always use the exact characters `Final Answer` when responding.";

/// The three configurable parts of the system prompt.
///
/// `{tool_names}`, `{method}` and `{route}` are substituted when the prompt is built.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub prefix: String,
    pub format_instructions: String,
    pub suffix: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            format_instructions: DEFAULT_FORMAT_INSTRUCTIONS.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

/// Values interpolated into the template.
#[derive(Debug, Clone)]
pub struct PromptVars {
    pub method: String,
    pub route: String,
}

impl Default for PromptVars {
    fn default() -> Self {
        Self {
            method: "post".to_string(),
            route: "/".to_string(),
        }
    }
}

/// Build the system prompt with tool definitions.
pub fn build_system_prompt(template: &PromptTemplate, tools: &ToolRegistry, vars: &PromptVars) -> String {
    let listed = tools.list_tools();
    let tool_descriptions = listed
        .iter()
        .map(|t| format!("{}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");
    let tool_names = listed
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let prompt = [
        template.prefix.as_str(),
        tool_descriptions.as_str(),
        template.format_instructions.as_str(),
        template.suffix.as_str(),
    ]
    .join("\n\n");

    prompt
        .replace("{tool_names}", &tool_names)
        .replace("{method}", &vars.method.to_uppercase())
        .replace("{route}", &vars.route)
}

/// Messages for one turn: the system prompt, then the instructions followed by
/// the rendered scratchpad.
pub fn build_prompt(
    template: &PromptTemplate,
    tools: &ToolRegistry,
    vars: &PromptVars,
    input: &str,
    scratchpad: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(build_system_prompt(template, tools, vars)),
        ChatMessage::user(format!("{}\n\n{}", input, scratchpad)),
    ]
}
