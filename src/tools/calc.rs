//! 计算器工具
//!
//! 对四则运算表达式做递归下降求值（+ - * / 括号 一元负号 小数），
//! 不依赖 shell 或外部进程，结果以十进制文本返回。

use std::iter::Peekable;
use std::str::Chars;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// 计算器：求值算术表达式
pub struct CalcTool;

#[async_trait]
impl Tool for CalcTool {
    fn name(&self) -> &str {
        "calc"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (+ - * / and parentheses). Args: {\"expression\": \"(3+4)*2\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string", "description": "arithmetic expression" }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let expression = args
            .get("expression")
            .or_else(|| args.get("input"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'expression'".to_string())?;
        let value = evaluate(expression)?;
        Ok(format_number(value))
    }
}

/// 求值入口：完整消费输入，残留字符视为错误
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: expression.chars().peekable(),
    };
    let value = parser.expr()?;
    parser.skip_whitespace();
    match parser.chars.peek() {
        None => Ok(value),
        Some(c) => Err(format!("unexpected character '{}'", c)),
    }
}

fn format_number(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.factor()?;
                }
                Some('/') => {
                    self.chars.next();
                    let rhs = self.factor()?;
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= rhs;
                }
                _ => return Ok(value),
            }
        }
    }

    // factor := '-' factor | '(' expr ')' | number
    fn factor(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        match self.chars.peek() {
            Some('-') => {
                self.chars.next();
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.chars.next();
                let value = self.expr()?;
                self.skip_whitespace();
                match self.chars.next() {
                    Some(')') => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(c) if c.is_ascii_digit() || *c == '.' => self.number(),
            Some(c) => Err(format!("unexpected character '{}'", c)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let mut text = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            text.push(self.chars.next().unwrap());
        }
        text.parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_basic() {
        assert_eq!(evaluate("(3+4)*2").unwrap(), 14.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("-3 + 5").unwrap(), 2.0);
        assert_eq!(evaluate("-(2 + 3) * 2").unwrap(), -10.0);
    }

    #[test]
    fn test_evaluate_errors() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("hello").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[tokio::test]
    async fn test_tool_execute() {
        let tool = CalcTool;
        let out = tool
            .execute(serde_json::json!({ "expression": "(3+4)*2" }))
            .await
            .unwrap();
        assert_eq!(out, "14");

        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("expression"));
    }
}
