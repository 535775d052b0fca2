//! Common-nickname clusters.
//!
//! A name may belong to several clusters ("al" is short for both Albert and
//! Alexander). Cluster ids are positions in [`CLUSTERS`] and therefore stable
//! only as long as the table is append-only.

use std::{
  collections::{BTreeSet, HashMap},
  fmt,
  sync::LazyLock,
};

use serde::{Deserialize, Serialize};

/// Identifier of one nickname cluster.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct NicknameCluster(pub u16);

impl fmt::Display for NicknameCluster {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Append-only. Entries are already normalized (lower case, no spaces).
const CLUSTERS: &[&[&str]] = &[
  &["william", "bill", "billy", "will", "willy", "liam"],
  &["robert", "bob", "bobby", "rob", "robbie", "bert"],
  &["richard", "dick", "rich", "rick", "ricky"],
  &["james", "jim", "jimmy", "jamie"],
  &["michael", "mike", "mikey", "mick", "mickey"],
  &["thomas", "tom", "tommy"],
  &["katherine", "catherine", "kathryn", "kate", "kathy", "katie", "cathy", "kat"],
  &["elizabeth", "liz", "lizzie", "beth", "betty", "eliza", "libby"],
  &["margaret", "maggie", "meg", "peggy", "marge"],
  &["anthony", "tony"],
  &["joseph", "joe", "joey"],
  &["john", "jack", "johnny", "jon"],
  &["david", "dave", "davy"],
  &["daniel", "dan", "danny"],
  &["samuel", "sam", "sammy"],
  &["samantha", "sam", "sammy"],
  &["alexander", "alex", "al", "sasha", "xander"],
  &["alexandra", "alex", "sasha", "lexi"],
  &["albert", "al", "bert"],
  &["edward", "ed", "eddie", "ted", "ned"],
  &["charles", "charlie", "chuck", "chas"],
  &["christopher", "chris", "kit"],
  &["christina", "christine", "chris", "tina"],
  &["jennifer", "jen", "jenny"],
  &["patricia", "pat", "patty", "trish"],
  &["patrick", "pat", "paddy"],
  &["nicholas", "nick", "nicky"],
  &["steven", "stephen", "steve"],
  &["benjamin", "ben", "benny"],
  &["matthew", "matt"],
  &["andrew", "andy", "drew"],
  &["deborah", "debbie", "deb"],
  &["susan", "sue", "suzy"],
  &["gregory", "greg"],
  &["timothy", "tim", "timmy"],
  &["frederick", "fred", "freddie"],
  &["lawrence", "larry"],
  &["victoria", "vicky", "tori"],
];

static INDEX: LazyLock<HashMap<&'static str, Vec<NicknameCluster>>> =
  LazyLock::new(|| {
    let mut index: HashMap<&'static str, Vec<NicknameCluster>> = HashMap::new();
    for (position, names) in CLUSTERS.iter().enumerate() {
      let cluster = NicknameCluster(position as u16);
      for &name in names.iter() {
        index.entry(name).or_default().push(cluster);
      }
    }
    index
  });

/// Clusters containing the already-normalized `name`; empty when unmapped.
pub fn clusters_for(name: &str) -> BTreeSet<NicknameCluster> {
  INDEX
    .get(name)
    .map(|clusters| clusters.iter().copied().collect())
    .unwrap_or_default()
}
