//! 实验结果.

use crate::profile::Profile;
use std::io::{self, Write};

/// 将 `profile` 的结果写进 `w` 中.
fn describe_into<W: Write>(name: &str, p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.4}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Variant `{name}`:")?;
    writeln!(w, "{S4}Images: {}", p.images())?;
    writeln!(w, "{S4}Recall: {}", f64_to_display(p.recall()))?;
    writeln!(w, "{S4}False positives: {}", p.false_positives())?;
    writeln!(w, "{S4}Duplicates: {}", p.duplicates())?;
    writeln!(w, "{S4}Average locate time: {} us", f64_to_display(p.avg_time_us()))?;
    let t = p.most_time_consuming().map(|d| d.as_micros() as f64);
    write!(w, "{S4}Most time-consuming image costs {} us", f64_to_display(t))?;
    Ok(())
}

/// 消融实验最终结果.
pub struct AblationResult {
    data: Vec<(&'static str, Profile)>,
}

impl FromIterator<(&'static str, Profile)> for AblationResult {
    fn from_iter<I: IntoIterator<Item = (&'static str, Profile)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }
}

impl AblationResult {
    /// 输出运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        utils::sep_to(&mut out)?;
        for (key, profile) in self.data.iter() {
            describe_into(key, profile, &mut out)?;
            writeln!(out)?;
            utils::sep_to(&mut out)?;
        }
        Ok(())
    }
}
