//! Built-in Tools

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, ParameterSchema, ToolArgs, ToolHandler, ToolMetadata, ToolRegistry};
use crate::error::{AgentError, Result};

/// Register `calculate`, `datetime` and `echo`. Returns how many were added.
pub fn register_builtin_tools(registry: &ToolRegistry) -> usize {
    [
        registry.register(CalculatorTool::metadata(), CalculatorTool),
        registry.register(DateTimeTool::metadata(), DateTimeTool),
        registry.register(EchoTool::metadata(), EchoTool),
    ]
    .into_iter()
    .filter(|added| *added)
    .count()
}

/// DateTime tool - returns current time
pub struct DateTimeTool;

impl DateTimeTool {
    pub fn metadata() -> ToolMetadata {
        ToolMetadata::new("datetime", "Get the current date and time")
            .with_parameter(
                ParameterSchema::optional(
                    "format",
                    "string",
                    "Output format: 'iso', 'human', or 'unix'",
                )
                    .with_default(json!("human"))
                    .with_enum(vec![json!("iso"), json!("human"), json!("unix")]),
            )
            .with_tags(["time", "utility"])
    }
}

#[async_trait]
impl ToolHandler for DateTimeTool {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let format = args.get("format").and_then(Value::as_str).unwrap_or("human");

        let now = chrono::Utc::now();

        let output = match format {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        };

        Ok(Value::String(output))
    }
}

/// Echo tool - returns its `text` argument unchanged
pub struct EchoTool;

impl EchoTool {
    pub fn metadata() -> ToolMetadata {
        ToolMetadata::new("echo", "Repeat the given text back")
            .with_parameter(ParameterSchema::required("text", "string", "Text to repeat"))
            .with_tags(["utility"])
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        Ok(json!(required_str(args, "text")?))
    }
}

/// Calculator tool - evaluates arithmetic expressions
pub struct CalculatorTool;

impl CalculatorTool {
    pub fn metadata() -> ToolMetadata {
        ToolMetadata::new("calculate", "Evaluate an arithmetic expression")
            .with_parameter(ParameterSchema::required(
                "expression",
                "string",
                "Arithmetic expression using numbers, + - * / % ^ and parentheses \
                 (e.g., '(2 + 3) * 4')",
            ))
            .with_tags(["math", "utility"])
    }
}

#[async_trait]
impl ToolHandler for CalculatorTool {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let expr = required_str(args, "expression")?;
        let result = evaluate_expression(expr)?;
        Ok(Value::String(format!("{} = {}", expr.trim(), format_number(result))))
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Deepest nesting of parentheses, signs and exponents the evaluator accepts
const MAX_NESTING: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &expr[start..end];
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| AgentError::Parse(format!("Invalid number '{}'", literal)))?;
                tokens.push(Token::Number(number));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => {
                return Err(AgentError::Parse(format!(
                    "Invalid character '{}' in expression",
                    other
                )));
            }
        };
        tokens.push(token);
        chars.next();
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over
///
/// ```text
/// expr  := term (('+' | '-') term)*
/// term  := unary (('*' | '/' | '%') unary)*
/// unary := ('-' | '+') unary | power
/// power := atom ('^' unary)?
/// atom  := number | '(' expr ')'
/// ```
///
/// Every recursive path goes through `unary`, which caps nesting at
/// [`MAX_NESTING`].
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::Percent)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                Token::Star => value * rhs,
                _ if rhs == 0.0 => {
                    return Err(AgentError::ToolExecution("Division by zero".into()));
                }
                Token::Slash => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64> {
        if self.depth >= MAX_NESTING {
            return Err(AgentError::Parse("Expression nested too deeply".into()));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(AgentError::Parse("Missing closing parenthesis".into())),
                }
            }
            Some(token) => Err(AgentError::Parse(format!("Unexpected token {:?}", token))),
            None => Err(AgentError::Parse("Unexpected end of expression".into())),
        }
    }
}

/// Evaluate an arithmetic expression. Only numbers, `+ - * / % ^` and
/// parentheses are accepted.
pub fn evaluate_expression(expr: &str) -> Result<f64> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(AgentError::Parse("Empty expression".into()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;

    if let Some(token) = parser.peek() {
        return Err(AgentError::Parse(format!("Unexpected token {:?}", token)));
    }
    if !value.is_finite() {
        return Err(AgentError::ToolExecution("Result is not a finite number".into()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolCall;

    fn eval(expr: &str) -> f64 {
        evaluate_expression(expr).unwrap()
    }

    #[test]
    fn test_calculator() {
        assert!((eval("2 + 2") - 4.0).abs() < f64::EPSILON);
        assert!((eval("10 * 5") - 50.0).abs() < f64::EPSILON);
        assert!((eval("(2 + 3) * 4") - 20.0).abs() < f64::EPSILON);
        assert!((eval("2 ^ 8") - 256.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert!((eval("2 + 3 * 4") - 14.0).abs() < f64::EPSILON);
        assert!((eval("10 - 4 - 3") - 3.0).abs() < f64::EPSILON);
        assert!((eval("2 ^ 3 ^ 2") - 512.0).abs() < f64::EPSILON);
        assert!((eval("-2 ^ 2") + 4.0).abs() < f64::EPSILON);
        assert!((eval("5 - (1 - 3)") - 7.0).abs() < f64::EPSILON);
        assert!((eval("7 % 4") - 3.0).abs() < f64::EPSILON);
        assert!((eval("1.5 * -2") + 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_non_arithmetic_input() {
        assert!(matches!(evaluate_expression("__import__('os')"), Err(AgentError::Parse(_))));
        assert!(matches!(evaluate_expression("2 +"), Err(AgentError::Parse(_))));
        assert!(matches!(evaluate_expression("(1 + 2"), Err(AgentError::Parse(_))));
        assert!(matches!(evaluate_expression("1 2"), Err(AgentError::Parse(_))));
        assert!(matches!(evaluate_expression("1..2"), Err(AgentError::Parse(_))));
        assert!(matches!(evaluate_expression(""), Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(evaluate_expression(&parens), Err(AgentError::Parse(_))));

        let signs = format!("{}1", "-".repeat(100_000));
        assert!(matches!(evaluate_expression(&signs), Err(AgentError::Parse(_))));

        let powers = format!("2{}", "^1".repeat(100_000));
        assert!(matches!(evaluate_expression(&powers), Err(AgentError::Parse(_))));

        // moderate nesting still evaluates
        let nested = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert!((eval(&nested) - 7.0).abs() < f64::EPSILON);
        assert!((eval("--3") - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_deep_nesting_through_registry_is_contained() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry);
        let mut args = ToolArgs::new();
        args.insert("expression".into(), json!("(".repeat(100_000)));

        let result = registry
            .execute(&ToolCall::new("calculate", args))
            .await;
        assert!(!result.is_success());
        assert!(result.output.contains("nested too deeply"));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(evaluate_expression("1 / 0"), Err(AgentError::ToolExecution(_))));
        assert!(matches!(evaluate_expression("1 % (2 - 2)"), Err(AgentError::ToolExecution(_))));
    }

    #[tokio::test]
    async fn test_calculator_tool_output() {
        let mut args = ToolArgs::new();
        args.insert("expression".into(), json!("(2 + 3) * 4"));
        let out = CalculatorTool.call(&args).await.unwrap();
        assert_eq!(out, json!("(2 + 3) * 4 = 20"));
    }

    #[test]
    fn test_register_builtin_tools() {
        let registry = ToolRegistry::new();
        assert_eq!(register_builtin_tools(&registry), 3);
        assert_eq!(registry.names(), vec!["calculate", "datetime", "echo"]);
        assert_eq!(registry.by_tag("math"), vec!["calculate"]);

        // second registration is a no-op
        assert_eq!(register_builtin_tools(&registry), 0);
    }
}
