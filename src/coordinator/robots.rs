//! Minimal robots.txt reader: the `Allow`/`Disallow` rules of the group that
//! applies to our user agent, matched with longest-prefix precedence.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

/// Exclusion rules published by one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlPolicy {
    rules: Vec<Rule>,
}

impl CrawlPolicy {
    /// A policy that allows every path.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// A policy that disallows every path. Used when robots.txt cannot be
    /// read because of a server error or an unreachable host.
    pub fn disallow_all() -> Self {
        Self {
            rules: vec![Rule {
                allow: false,
                pattern: "/".to_string(),
            }],
        }
    }

    /// Parse a robots.txt body, keeping the group for `agent` (product token match,
    /// case-insensitive) or the `*` group when no specific group exists.
    pub fn parse(body: &str, agent: &str) -> Self {
        let agent = agent.to_lowercase();
        let mut specific: Vec<Rule> = Vec::new();
        let mut wildcard: Vec<Rule> = Vec::new();
        let mut found_specific = false;

        // Agents of the group being read; a new group starts at the first
        // user-agent line that follows a rule line.
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for raw_line in body.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else { continue };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // An empty Disallow means "allow everything" and adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    let rule = Rule { allow: key == "allow", pattern: value.to_string() };
                    let matches_us = group_agents
                        .iter()
                        .any(|a| a != "*" && !a.is_empty() && agent.contains(a.as_str()));
                    if matches_us {
                        found_specific = true;
                        specific.push(rule.clone());
                    }
                    if group_agents.iter().any(|a| a == "*") {
                        wildcard.push(rule);
                    }
                }
                _ => {}
            }
        }

        Self { rules: if found_specific { specific } else { wildcard } }
    }

    /// Longest matching pattern wins; on a tie `Allow` wins. No match = allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;
        for rule in &self.rules {
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let len = rule.pattern.len();
            best = match best {
                Some((best_len, best_allow)) if best_len > len || (best_len == len && best_allow) => {
                    Some((best_len, best_allow))
                }
                _ => Some((len, rule.allow)),
            };
        }
        best.map_or(true, |(_, allow)| allow)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// `*` matches any run of characters, a trailing `$` anchors at the end.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let mut pieces = pattern.split('*');
    let Some(first) = pieces.next() else { return true };
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let rest: Vec<&str> = pieces.collect();
    for (i, piece) in rest.iter().enumerate() {
        let is_last = i + 1 == rest.len();
        if is_last && anchored {
            return path.len() >= pos + piece.len() && path.ends_with(piece);
        }
        match path[pos..].find(piece) {
            Some(idx) => pos += idx + piece.len(),
            None => return false,
        }
    }
    !anchored || pos == path.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
# example
User-agent: *
Disallow: /admin
Disallow: /busca?*ordem=
Allow: /admin/public
Disallow: /*.pdf$

User-agent: BadBot
Disallow: /
";

    #[test]
    fn wildcard_group_applies_to_generic_agents() {
        let policy = CrawlPolicy::parse(ROBOTS, "Mozilla/5.0 Chrome/120");
        assert!(policy.is_allowed("/imoveis?page=1"));
        assert!(!policy.is_allowed("/admin/settings"));
        assert!(policy.is_allowed("/admin/public/list"));
        assert!(!policy.is_allowed("/docs/edital.pdf"));
        assert!(policy.is_allowed("/docs/edital.pdf.html"));
        assert!(!policy.is_allowed("/busca?cidade=sp&ordem=preco"));
        assert!(policy.is_allowed("/busca?cidade=sp"));
    }

    #[test]
    fn specific_group_overrides_wildcard() {
        let policy = CrawlPolicy::parse(ROBOTS, "BadBot/1.0");
        assert!(!policy.is_allowed("/imoveis"));
        assert_eq!(policy.rule_count(), 1);
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let policy = CrawlPolicy::parse("User-agent: *\nDisallow:\n", "any");
        assert!(policy.is_allowed("/anything"));
        assert!(CrawlPolicy::allow_all().is_allowed("/"));
    }

    #[test]
    fn disallow_all_blocks_every_path() {
        let policy = CrawlPolicy::disallow_all();
        assert!(!policy.is_allowed("/"));
        assert!(!policy.is_allowed("/imoveis?page=1"));
        assert!(!policy.is_allowed("/imovel/123/"));
    }

    #[test]
    fn consecutive_user_agents_share_a_group() {
        let body = "User-agent: a\nUser-agent: *\nDisallow: /private\n";
        let policy = CrawlPolicy::parse(body, "zzz");
        assert!(!policy.is_allowed("/private/x"));
    }
}
