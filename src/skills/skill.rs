//! 技能定义与变量替换
//!
//! SKILL.md = 结构化头（--- 围栏内的 key: value 行）+ 自由文本正文。
//! 正文渲染只做字面替换（$ARGUMENTS、${SESSION_ID}），未解析的占位符原样保留，
//! 不是模板语言。

use std::path::PathBuf;

/// 已物化的技能：头字段 + 正文 + 支持文件清单
#[derive(Debug, Clone)]
pub struct Skill {
    /// 规范名（目录名连字符化），即 /命令 名
    pub name: String,
    pub description: String,
    /// 参数提示，如 "[file] [notes]"
    pub argument_hint: String,
    /// 允许的工具名；为空表示不限制
    pub allowed_tools: Vec<String>,
    /// 正文模板（头之后的全部文本）
    pub body: String,
    /// 技能目录下发现的支持文件（相对路径）
    pub support_files: Vec<PathBuf>,
    pub dir: PathBuf,
}

impl Skill {
    /// 渲染正文：$ARGUMENTS 替换为原始参数串；正文没有该占位符且参数非空时
    /// 以 ARGUMENTS: 结尾追加；${SESSION_ID} 替换为会话 ID（提供时）
    pub fn render(&self, arguments: &str, session_id: Option<&str>) -> String {
        let mut content = if self.body.contains("$ARGUMENTS") {
            self.body.replace("$ARGUMENTS", arguments)
        } else if !arguments.is_empty() {
            format!("{}\n\nARGUMENTS: {}", self.body, arguments)
        } else {
            self.body.clone()
        };

        if let Some(sid) = session_id {
            content = content.replace("${SESSION_ID}", sid);
        }

        content
    }

    /// 注入 system prompt 的段落形式
    pub fn prompt_section(&self, arguments: &str, session_id: Option<&str>) -> String {
        format!("## 技能: {}\n{}", self.name, self.render(arguments, session_id))
    }
}

/// 解析出的头字段；name 缺省时用目录名
#[derive(Debug, Clone, Default)]
pub(crate) struct SkillHeader {
    pub name: Option<String>,
    pub description: String,
    pub argument_hint: String,
    pub allowed_tools: Vec<String>,
}

/// 解析 --- 围栏内的头行：key: value；allowed-tools 支持逗号分隔或 "- 项" 续行
pub(crate) fn parse_header(lines: &[String]) -> SkillHeader {
    let mut header = SkillHeader::default();
    let mut in_tools_list = false;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if in_tools_list {
            if let Some(item) = trimmed.strip_prefix('-') {
                let item = item.trim();
                if !item.is_empty() {
                    header.allowed_tools.push(item.to_string());
                }
                continue;
            }
            in_tools_list = false;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value.trim());

        match key.as_str() {
            "name" => header.name = Some(value.to_string()),
            "description" => header.description = value.to_string(),
            "argument-hint" => header.argument_hint = value.to_string(),
            "allowed-tools" => {
                if value.is_empty() {
                    in_tools_list = true;
                } else {
                    header.allowed_tools = value
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                }
            }
            _ => {}
        }
    }

    header
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    if v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')))
    {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(body: &str) -> Skill {
        Skill {
            name: "review".to_string(),
            description: String::new(),
            argument_hint: String::new(),
            allowed_tools: vec![],
            body: body.to_string(),
            support_files: vec![],
            dir: PathBuf::from("."),
        }
    }

    #[test]
    fn test_render_substitutes_arguments_literally() {
        let s = skill("请审查 $ARGUMENTS 并输出问题列表。");
        let rendered = s.render("contracts/a.docx extra", None);
        assert_eq!(rendered, "请审查 contracts/a.docx extra 并输出问题列表。");
    }

    #[test]
    fn test_render_appends_arguments_without_placeholder() {
        let s = skill("请审查合同。");
        let rendered = s.render("a.docx", None);
        assert_eq!(rendered, "请审查合同。\n\nARGUMENTS: a.docx");

        // 参数为空则不追加
        assert_eq!(s.render("", None), "请审查合同。");
    }

    #[test]
    fn test_render_session_and_unresolved_placeholders() {
        let s = skill("会话 ${SESSION_ID}，其他 ${UNKNOWN_VAR} 原样保留。");
        let rendered = s.render("", Some("s-42"));
        assert_eq!(rendered, "会话 s-42，其他 ${UNKNOWN_VAR} 原样保留。");

        // 未提供会话 ID 时占位符原样保留
        let rendered = s.render("", None);
        assert!(rendered.contains("${SESSION_ID}"));
    }

    #[test]
    fn test_parse_header_fields() {
        let lines: Vec<String> = [
            "name: review",
            "description: \"审查文档并列出问题\"",
            "argument-hint: [file] [notes]",
            "allowed-tools: read_doc, calc",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let h = parse_header(&lines);
        assert_eq!(h.name.as_deref(), Some("review"));
        assert_eq!(h.description, "审查文档并列出问题");
        assert_eq!(h.argument_hint, "[file] [notes]");
        assert_eq!(h.allowed_tools, vec!["read_doc", "calc"]);
    }

    #[test]
    fn test_parse_header_list_form() {
        let lines: Vec<String> = ["allowed-tools:", "  - read_doc", "  - echo", "description: x"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let h = parse_header(&lines);
        assert_eq!(h.allowed_tools, vec!["read_doc", "echo"]);
        assert_eq!(h.description, "x");
    }
}
