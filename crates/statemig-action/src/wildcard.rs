//! Wildcard address patterns for `xmv`
//!
//! `*` matches within one address segment: characters other than `.`,
//! plus bracketed instance keys, whose quoted strings may contain `.`.
//! The destination template refers to the matched segments as `$1` to `$9`.

use regex::Regex;

/// What one `*` may match
const SEGMENT: &str = r#"((?:[^.\["]|\[(?:"(?:[^"\\]|\\.)*"|[^\]"]*)\])+)"#;

/// Compiled `xmv` source pattern plus its destination template
#[derive(Debug, Clone)]
pub struct WildcardMove {
    regex: Regex,
    template: String,
    wildcards: usize,
}

impl WildcardMove {
    /// Compile a pattern and check the template against it
    ///
    /// # Errors
    /// Returns a reason when the pattern has no wildcard, has more than
    /// nine, or the template refers to a capture that does not exist
    pub fn compile(pattern: &str, template: &str) -> Result<Self, String> {
        let wildcards = pattern.matches('*').count();
        if wildcards == 0 {
            return Err("pattern has no `*`; use mv".to_string());
        }
        if wildcards > 9 {
            return Err(format!("pattern has {wildcards} wildcards, at most 9 are supported"));
        }
        if pattern.contains("**") {
            return Err("adjacent wildcards are ambiguous".to_string());
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(SEGMENT);
        let regex = Regex::new(&format!("^{body}$")).map_err(|e| e.to_string())?;

        for reference in template_refs(template) {
            if reference == 0 || reference > wildcards {
                return Err(format!(
                    "template refers to ${reference} but the pattern has {wildcards} wildcard(s)"
                ));
            }
        }

        Ok(Self {
            regex,
            template: template.to_string(),
            wildcards,
        })
    }

    /// Number of `*` in the pattern
    #[inline]
    #[must_use]
    pub fn wildcards(&self) -> usize {
        self.wildcards
    }

    /// Destination for `address`, or `None` if it does not match
    #[must_use]
    pub fn expand(&self, address: &str) -> Option<String> {
        let captures = self.regex.captures(address)?;
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, chars.peek().and_then(|d| d.to_digit(10))) {
                ('$', Some(n)) => {
                    chars.next();
                    out.push_str(captures.get(n as usize).map_or("", |m| m.as_str()));
                }
                _ => out.push(c),
            }
        }
        Some(out)
    }
}

fn template_refs(template: &str) -> impl Iterator<Item = usize> + '_ {
    let bytes = template.as_bytes();
    bytes.windows(2).filter_map(|w| match w {
        [b'$', d] if d.is_ascii_digit() => Some(usize::from(d - b'0')),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_one_segment() {
        let m = WildcardMove::compile("module.app.aws_s3_bucket.*", "module.storage.aws_s3_bucket.$1")
            .unwrap();
        assert_eq!(
            m.expand("module.app.aws_s3_bucket.logs").as_deref(),
            Some("module.storage.aws_s3_bucket.logs")
        );
        assert_eq!(m.expand("module.app.module.x.aws_s3_bucket.logs"), None);
        assert_eq!(m.expand("module.app.aws_s3_bucket."), None);
    }

    #[test]
    fn captures_can_be_reordered() {
        let m = WildcardMove::compile("module.*.aws_instance.*", "module.compute.aws_instance.$1_$2")
            .unwrap();
        assert_eq!(m.wildcards(), 2);
        assert_eq!(
            m.expand("module.eu.aws_instance.web").as_deref(),
            Some("module.compute.aws_instance.eu_web")
        );
    }

    #[test]
    fn instance_keys_stay_with_the_segment() {
        let m = WildcardMove::compile("aws_instance.*", "module.web.aws_instance.$1").unwrap();
        assert_eq!(
            m.expand(r#"aws_instance.web["a"]"#).as_deref(),
            Some(r#"module.web.aws_instance.web["a"]"#)
        );
    }

    #[test]
    fn quoted_keys_may_contain_dots() {
        let m = WildcardMove::compile("aws_route53_record.*", "module.dns.aws_route53_record.$1")
            .unwrap();
        assert_eq!(
            m.expand(r#"aws_route53_record.r["www.example.com"]"#).as_deref(),
            Some(r#"module.dns.aws_route53_record.r["www.example.com"]"#)
        );
        assert_eq!(
            m.expand(r#"aws_route53_record.r["say \"a.b\""]"#).as_deref(),
            Some(r#"module.dns.aws_route53_record.r["say \"a.b\""]"#)
        );
        assert_eq!(m.expand("aws_route53_record.r.extra"), None);
    }

    #[test]
    fn star_before_a_literal_key() {
        let m = WildcardMove::compile("aws_instance.*[0]", "aws_instance.$1_first").unwrap();
        assert_eq!(
            m.expand("aws_instance.web[0]").as_deref(),
            Some("aws_instance.web_first")
        );
    }

    #[test]
    fn literal_parts_are_escaped() {
        let m = WildcardMove::compile("aws_instance.web[0].*", "x.$1");
        assert!(m.is_ok());
        assert_eq!(m.unwrap().expand("aws_instance.webX0].y"), None);
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(WildcardMove::compile("aws_instance.web", "aws_instance.api").is_err());
        assert!(WildcardMove::compile("aws_instance.**", "x.$1").is_err());
        assert!(WildcardMove::compile("aws_instance.*", "x.$2").is_err());
        assert!(WildcardMove::compile("aws_instance.*", "x.$0").is_err());
    }
}
