use super::{ChatMessage, Role};

pub const SYSTEM_INSTRUCTION: &str =
    "You are a Python code generator. Output ONLY valid Python code. No markdown.";

/// The instruction asking for one complete top-level `def` named `name`.
pub fn render(name: &str, signature: &str, docstring: Option<&str>) -> String {
    format!(
        "You are an expert Python code generator.\n\
         Write the implementation of the following Python function.\n\
         \n\
         Function name: {name}\n\
         Signature: {signature}\n\
         Docstring: {doc}\n\
         \n\
         Instructions:\n\
         1. Return ONLY valid Python code for the function.\n\
         2. The code MUST include the function definition (`def {name}(...):`) at the top level.\n\
         3. Do NOT wrap the code in markdown blocks (like ```python ... ```).\n\
         4. Do NOT include explanations or any text outside the code.\n\
         5. The implementation must match the signature and docstring exactly.\n\
         6. Only the `math` and `typing` modules may be imported.\n",
        doc = docstring.unwrap_or("None"),
    )
}

pub fn messages(name: &str, signature: &str, docstring: Option<&str>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(Role::System, SYSTEM_INSTRUCTION),
        ChatMessage::new(Role::User, render(name, signature, docstring)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_the_declaration() {
        let prompt = render("fibonacci", "(n: int) -> int", Some("Returns the nth Fibonacci number."));
        assert!(prompt.contains("Function name: fibonacci"));
        assert!(prompt.contains("Signature: (n: int) -> int"));
        assert!(prompt.contains("Docstring: Returns the nth Fibonacci number."));
        assert!(prompt.contains("`def fibonacci(...):`"));
    }

    #[test]
    fn conversation_is_system_then_user() {
        let messages = messages("f", "()", None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("Docstring: None"));
    }
}
