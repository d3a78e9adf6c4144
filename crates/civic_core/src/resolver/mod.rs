//! Representative Resolver: maps raw movant/second strings onto canonical
//! representatives.
//!
//! Matching is a cascade of four tiers (exact alias, folded alias, token
//! containment, fuzzy similarity). Every read and write of the alias index
//! happens under one mutex, so concurrent documents observe resolution one
//! name at a time. Store writes for a resolution are issued while the lock is
//! held, which keeps merges atomic with respect to other resolutions.

pub mod names;
pub mod similarity;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config::ResolverSection;
use crate::db::VotingStore;
use crate::error::PipelineError;
use crate::schema::{DistrictHint, Representative};
use names::{choose_display_name, containment_match, name_key, qualified_alias, split_district_suffix};
use similarity::StringSimilarity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    CaseInsensitive,
    Containment,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionEvent {
    /// Matched an identity that already knew this alias.
    Matched(MatchTier),
    /// Matched an identity and recorded a new alias for it.
    AliasAdded(MatchTier),
    /// No identity matched; a new one was created.
    Created,
    /// Tier 4 was ambiguous; a new provisional identity was created instead.
    CreatedAfterConflict { candidates: Vec<String> },
    /// The match exposed two identities as the same person.
    Merged { tier: MatchTier, absorbed: String },
}

impl ResolutionEvent {
    /// The deferred conflict behind a `CreatedAfterConflict` event, for
    /// logging and later reconciliation.
    pub fn conflict(&self, name: &str) -> Option<PipelineError> {
        match self {
            Self::CreatedAfterConflict { candidates } => Some(PipelineError::ResolverMergeConflict {
                name: name.to_string(),
                candidates: candidates.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub representative_id: String,
    pub event: ResolutionEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub survivor: String,
    /// `None` when both ids already referred to the same identity.
    pub absorbed: Option<String>,
}

enum TierOutcome {
    Found { id: String, tier: MatchTier },
    Conflict { candidates: Vec<String>, scores: Vec<f64> },
    NoMatch,
}

#[derive(Default)]
struct AliasIndex {
    reps: HashMap<String, Representative>,
    by_alias: HashMap<String, String>,
    by_key: HashMap<String, BTreeSet<String>>,
    next_seq: u64,
}

impl AliasIndex {
    fn build(reps: Vec<Representative>) -> Self {
        let mut index = Self::default();
        for rep in reps {
            index.next_seq = index.next_seq.max(rep.created_seq + 1);
            index.register_aliases(&rep);
            index.reps.insert(rep.id.clone(), rep);
        }
        index
    }

    fn register_aliases(&mut self, rep: &Representative) {
        if !rep.is_active() {
            return;
        }
        for alias in &rep.aliases {
            self.by_alias.insert(alias.clone(), rep.id.clone());
            self.by_key
                .entry(name_key(&split_district_suffix(alias).0))
                .or_default()
                .insert(rep.id.clone());
        }
    }

    fn unregister_aliases(&mut self, rep: &Representative) {
        for alias in &rep.aliases {
            if self.by_alias.get(alias) == Some(&rep.id) {
                self.by_alias.remove(alias);
            }
            let key = name_key(&split_district_suffix(alias).0);
            if let Some(ids) = self.by_key.get_mut(&key) {
                ids.remove(&rep.id);
                if ids.is_empty() {
                    self.by_key.remove(&key);
                }
            }
        }
    }

    /// Follow `merged_into` links to the surviving identity.
    fn canonical_id(&self, id: &str) -> Option<String> {
        let mut current = self.reps.get(id)?;
        let mut hops = 0;
        while let Some(next) = &current.merged_into {
            current = self.reps.get(next)?;
            hops += 1;
            if hops > self.reps.len() {
                return None;
            }
        }
        Some(current.id.clone())
    }

    fn active(&self) -> impl Iterator<Item = &Representative> {
        self.reps.values().filter(|rep| rep.is_active())
    }
}

fn compatible(rep: &Representative, hint: Option<&DistrictHint>) -> bool {
    match (hint, &rep.district) {
        (Some(hint), Some(district)) if hint.is_strict() => *district == hint.district,
        _ => true,
    }
}

fn same_district(rep: &Representative, hint: Option<&DistrictHint>) -> bool {
    matches!((hint, &rep.district), (Some(hint), Some(d)) if *d == hint.district)
}

/// Pick the single candidate whose district equals the hint, if exactly one.
fn district_tie_break<'a>(
    candidates: impl IntoIterator<Item = &'a Representative>,
    hint: Option<&DistrictHint>,
) -> Option<String> {
    let matching: Vec<&Representative> = candidates
        .into_iter()
        .filter(|rep| same_district(rep, hint))
        .collect();
    match matching.as_slice() {
        [only] => Some(only.id.clone()),
        _ => None,
    }
}

pub struct RepresentativeResolver {
    index: Mutex<AliasIndex>,
    similarity: Box<dyn StringSimilarity>,
    accept_threshold: f64,
    ambiguity_margin: f64,
    store: Arc<dyn VotingStore>,
}

impl RepresentativeResolver {
    /// Build the resolver from every representative already persisted.
    pub fn new(
        store: Arc<dyn VotingStore>,
        similarity: Box<dyn StringSimilarity>,
        accept_threshold: f64,
        ambiguity_margin: f64,
    ) -> Result<Self, PipelineError> {
        let reps = store.load_representatives()?;
        tracing::debug!(count = reps.len(), "Loaded representatives");
        Ok(Self {
            index: Mutex::new(AliasIndex::build(reps)),
            similarity,
            accept_threshold,
            ambiguity_margin,
            store,
        })
    }

    pub fn from_config(
        store: Arc<dyn VotingStore>,
        config: &ResolverSection,
    ) -> Result<Self, PipelineError> {
        Self::new(
            store,
            similarity::for_algorithm(config.algorithm),
            config.accept_threshold,
            config.ambiguity_margin,
        )
    }

    fn lock(&self) -> Result<MutexGuard<'_, AliasIndex>, PipelineError> {
        self.index
            .lock()
            .map_err(|_| PipelineError::LockPoisoned("representative alias index"))
    }

    /// Resolve one raw name. Returns `None` for empty or placeholder names.
    pub fn resolve(
        &self,
        raw: &str,
        hint: Option<&DistrictHint>,
    ) -> Result<Option<Resolution>, PipelineError> {
        let (name, suffix_district) = split_district_suffix(raw);
        let key = name_key(&name);
        if key.is_empty() {
            return Ok(None);
        }
        let suffix_hint = suffix_district.map(DistrictHint::strict);
        let hint = suffix_hint.as_ref().or(hint);

        let mut index = self.lock()?;
        let resolution = match self.find_match(&index, &name, &key, hint, None) {
            TierOutcome::Found { id, tier } => {
                self.attach(&mut index, &id, &name, &key, tier, hint)?
            }
            TierOutcome::Conflict { candidates, scores } => {
                let id = self.create(&mut index, &name, hint, true)?;
                let event = ResolutionEvent::CreatedAfterConflict { candidates };
                if let Some(conflict) = event.conflict(&name) {
                    tracing::warn!(
                        error = %conflict,
                        scores = ?scores,
                        provisional = %id,
                        "Ambiguous representative match, created provisional identity"
                    );
                }
                Resolution {
                    representative_id: id,
                    event,
                }
            }
            TierOutcome::NoMatch => {
                let id = self.create(&mut index, &name, hint, false)?;
                tracing::debug!(name = %name, id = %id, "Created representative");
                Resolution {
                    representative_id: id,
                    event: ResolutionEvent::Created,
                }
            }
        };
        Ok(Some(resolution))
    }

    fn find_match(
        &self,
        index: &AliasIndex,
        name: &str,
        key: &str,
        hint: Option<&DistrictHint>,
        exclude: Option<&str>,
    ) -> TierOutcome {
        let eligible = |rep: &Representative| {
            rep.is_active() && compatible(rep, hint) && Some(rep.id.as_str()) != exclude
        };

        // Tier 1: exact alias.
        let qualified = hint
            .filter(|h| h.is_strict())
            .map(|h| qualified_alias(name, &h.district));
        for alias in qualified.iter().map(String::as_str).chain(std::iter::once(name)) {
            if let Some(rep) = index.by_alias.get(alias).and_then(|id| index.reps.get(id)) {
                if eligible(rep) {
                    return TierOutcome::Found {
                        id: rep.id.clone(),
                        tier: MatchTier::Exact,
                    };
                }
            }
        }

        // Tier 2: folded alias.
        if let Some(ids) = index.by_key.get(key) {
            let hits: Vec<&Representative> = ids
                .iter()
                .filter_map(|id| index.reps.get(id))
                .filter(|rep| eligible(rep))
                .collect();
            let picked = match hits.as_slice() {
                [only] => Some(only.id.clone()),
                [] => None,
                many => district_tie_break(many.iter().copied(), hint),
            };
            if let Some(id) = picked {
                return TierOutcome::Found {
                    id,
                    tier: MatchTier::CaseInsensitive,
                };
            }
        }

        // Tier 3: containment against exactly one identity.
        let contained: Vec<&Representative> = index
            .active()
            .filter(|rep| eligible(rep))
            .filter(|rep| {
                std::iter::once(&rep.canonical_name)
                    .chain(rep.aliases.iter())
                    .any(|alias| containment_match(key, &name_key(&split_district_suffix(alias).0)))
            })
            .collect();
        if let [only] = contained.as_slice() {
            return TierOutcome::Found {
                id: only.id.clone(),
                tier: MatchTier::Containment,
            };
        }

        // Tier 4: fuzzy similarity with an ambiguity margin.
        let mut scored: Vec<(f64, &Representative)> = index
            .active()
            .filter(|rep| eligible(rep))
            .map(|rep| {
                let best = std::iter::once(&rep.canonical_name)
                    .chain(rep.aliases.iter())
                    .map(|alias| {
                        self.similarity
                            .similarity(key, &name_key(&split_district_suffix(alias).0))
                    })
                    .fold(0.0_f64, f64::max);
                (best, rep)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.created_seq.cmp(&b.1.created_seq))
        });

        let Some(&(top_score, top)) = scored.first() else {
            return TierOutcome::NoMatch;
        };
        if top_score < self.accept_threshold {
            return TierOutcome::NoMatch;
        }
        let close: Vec<(f64, &Representative)> = scored
            .iter()
            .filter(|(score, _)| top_score - *score < self.ambiguity_margin)
            .copied()
            .collect();
        let contenders: Vec<&Representative> = close.iter().map(|(_, rep)| *rep).collect();
        if contenders.len() == 1 {
            return TierOutcome::Found {
                id: top.id.clone(),
                tier: MatchTier::Fuzzy,
            };
        }
        if let Some(id) = district_tie_break(contenders.iter().copied(), hint) {
            return TierOutcome::Found {
                id,
                tier: MatchTier::Fuzzy,
            };
        }
        TierOutcome::Conflict {
            candidates: contenders.iter().map(|rep| rep.id.clone()).collect(),
            scores: close.iter().map(|(score, _)| *score).collect(),
        }
    }

    fn attach(
        &self,
        index: &mut AliasIndex,
        id: &str,
        name: &str,
        key: &str,
        tier: MatchTier,
        hint: Option<&DistrictHint>,
    ) -> Result<Resolution, PipelineError> {
        let mut target = id.to_string();
        let mut merged_away = None;

        // An exact hit on a provisional identity or a fuzzy-attached alias is
        // weak evidence. With a strict district hint the other tiers may now
        // single out the identity it really belongs to.
        let strict = hint.is_some_and(DistrictHint::is_strict);
        if strict && matches!(tier, MatchTier::Exact | MatchTier::CaseInsensitive) {
            let weak = index
                .reps
                .get(id)
                .is_some_and(|rep| rep.provisional || rep.weak_aliases.contains(name));
            if weak {
                if let TierOutcome::Found { id: other, .. } =
                    self.find_match(index, name, key, hint, Some(id))
                {
                    let outcome = self.merge_locked(index, id, &other)?;
                    tracing::info!(
                        name = %name,
                        survivor = %outcome.survivor,
                        absorbed = ?outcome.absorbed,
                        "Merged representatives on stronger evidence"
                    );
                    target = outcome.survivor;
                    merged_away = outcome.absorbed;
                }
            }
        }

        let owner = index.by_alias.get(name).cloned();
        let alias = match owner {
            Some(owner) if owner == target => None,
            Some(_) => hint
                .filter(|h| h.is_strict())
                .map(|h| qualified_alias(name, &h.district))
                .filter(|qualified| !index.by_alias.contains_key(qualified)),
            None => Some(name.to_string()),
        };

        let mut rep = index
            .reps
            .get(&target)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownRepresentative(target.clone()))?;
        let added = alias.is_some();
        if let Some(alias) = &alias {
            rep.aliases.insert(alias.clone());
            if tier == MatchTier::Fuzzy {
                rep.weak_aliases.insert(alias.clone());
            }
            if let Some(display) = choose_display_name(&rep.aliases) {
                rep.canonical_name = display;
            }
        }
        if rep.district.is_none() {
            if let Some(hint) = hint.filter(|h| h.is_strict()) {
                rep.district = Some(hint.district.clone());
            }
        }
        rep.record_count += 1;

        self.store.upsert_representative(&rep)?;
        if let Some(alias) = alias {
            index.by_alias.insert(alias.clone(), rep.id.clone());
            index
                .by_key
                .entry(name_key(&split_district_suffix(&alias).0))
                .or_default()
                .insert(rep.id.clone());
        }
        index.reps.insert(rep.id.clone(), rep);

        let event = match merged_away {
            Some(absorbed) => ResolutionEvent::Merged { tier, absorbed },
            None if added => ResolutionEvent::AliasAdded(tier),
            None => ResolutionEvent::Matched(tier),
        };
        Ok(Resolution {
            representative_id: target,
            event,
        })
    }

    fn create(
        &self,
        index: &mut AliasIndex,
        name: &str,
        hint: Option<&DistrictHint>,
        provisional: bool,
    ) -> Result<String, PipelineError> {
        let seq = index.next_seq;
        let id = format!("rep-{seq:05}");
        let strict_district = hint.filter(|h| h.is_strict()).map(|h| h.district.clone());

        let alias = if index.by_alias.contains_key(name) {
            match &strict_district {
                Some(district) => qualified_alias(name, district),
                None => format!("{name} ({id})"),
            }
        } else {
            name.to_string()
        };

        let rep = Representative {
            id: id.clone(),
            canonical_name: name.to_string(),
            district: strict_district,
            aliases: BTreeSet::from([alias]),
            weak_aliases: BTreeSet::new(),
            record_count: 1,
            created_seq: seq,
            provisional,
            merged_into: None,
        };
        self.store.upsert_representative(&rep)?;
        index.next_seq = seq + 1;
        index.register_aliases(&rep);
        index.reps.insert(id.clone(), rep);
        Ok(id)
    }

    /// Merge two identities. The one with strictly more resolved records
    /// survives; ties go to the earlier-created identity. Merging identities
    /// that are already one is a no-op.
    pub fn merge(&self, a: &str, b: &str) -> Result<MergeOutcome, PipelineError> {
        let mut index = self.lock()?;
        self.merge_locked(&mut index, a, b)
    }

    fn merge_locked(
        &self,
        index: &mut AliasIndex,
        a: &str,
        b: &str,
    ) -> Result<MergeOutcome, PipelineError> {
        let a = index
            .canonical_id(a)
            .ok_or_else(|| PipelineError::UnknownRepresentative(a.to_string()))?;
        let b = index
            .canonical_id(b)
            .ok_or_else(|| PipelineError::UnknownRepresentative(b.to_string()))?;
        if a == b {
            return Ok(MergeOutcome {
                survivor: a,
                absorbed: None,
            });
        }

        let (rep_a, rep_b) = match (index.reps.get(&a), index.reps.get(&b)) {
            (Some(x), Some(y)) => (x.clone(), y.clone()),
            _ => return Err(PipelineError::UnknownRepresentative(format!("{a}/{b}"))),
        };
        let a_survives = rep_a.record_count > rep_b.record_count
            || (rep_a.record_count == rep_b.record_count && rep_a.created_seq <= rep_b.created_seq);
        let (old_survivor, old_absorbed) = if a_survives { (rep_a, rep_b) } else { (rep_b, rep_a) };

        let mut survivor = old_survivor.clone();
        survivor.aliases.extend(old_absorbed.aliases.iter().cloned());
        survivor
            .weak_aliases
            .extend(old_absorbed.weak_aliases.iter().cloned());
        survivor.record_count += old_absorbed.record_count;
        survivor.provisional = old_survivor.provisional && old_absorbed.provisional;
        if survivor.district.is_none() {
            survivor.district = old_absorbed.district.clone();
        }
        if let Some(display) = choose_display_name(&survivor.aliases) {
            survivor.canonical_name = display;
        }

        let mut absorbed = old_absorbed.clone();
        absorbed.aliases.clear();
        absorbed.weak_aliases.clear();
        absorbed.record_count = 0;
        absorbed.merged_into = Some(survivor.id.clone());

        self.store.merge_representatives(&absorbed, &survivor)?;

        index.unregister_aliases(&old_absorbed);
        index.unregister_aliases(&old_survivor);
        index.register_aliases(&survivor);
        for rep in index.reps.values_mut() {
            if rep.merged_into.as_deref() == Some(absorbed.id.as_str()) {
                rep.merged_into = Some(survivor.id.clone());
            }
        }
        let outcome = MergeOutcome {
            survivor: survivor.id.clone(),
            absorbed: Some(absorbed.id.clone()),
        };
        index.reps.insert(absorbed.id.clone(), absorbed);
        index.reps.insert(survivor.id.clone(), survivor);
        Ok(outcome)
    }

    /// Surviving id for any id ever issued.
    pub fn canonical_id(&self, id: &str) -> Result<Option<String>, PipelineError> {
        Ok(self.lock()?.canonical_id(id))
    }

    pub fn get(&self, id: &str) -> Result<Option<Representative>, PipelineError> {
        Ok(self.lock()?.reps.get(id).cloned())
    }

    /// Active identities ordered by creation.
    pub fn representatives(&self) -> Result<Vec<Representative>, PipelineError> {
        let index = self.lock()?;
        let mut reps: Vec<Representative> = index.active().cloned().collect();
        reps.sort_by_key(|rep| rep.created_seq);
        Ok(reps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::resolver::similarity::JaroWinkler;

    fn resolver() -> RepresentativeResolver {
        let store: Arc<dyn VotingStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        RepresentativeResolver::new(store, Box::new(JaroWinkler::default()), 0.9, 0.03).unwrap()
    }

    /// Scores come from a fixed table so tier-4 thresholds can be pinned.
    struct TableSimilarity(Vec<(&'static str, &'static str, f64)>);

    impl StringSimilarity for TableSimilarity {
        fn similarity(&self, a: &str, b: &str) -> f64 {
            self.0
                .iter()
                .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
                .map(|(_, _, score)| *score)
                .unwrap_or(0.0)
        }
    }

    fn table_resolver(table: Vec<(&'static str, &'static str, f64)>) -> RepresentativeResolver {
        let store: Arc<dyn VotingStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        RepresentativeResolver::new(store, Box::new(TableSimilarity(table)), 0.9, 0.03).unwrap()
    }

    fn resolve(r: &RepresentativeResolver, name: &str) -> Resolution {
        r.resolve(name, None).unwrap().unwrap()
    }

    #[test]
    fn first_sighting_creates_identity_then_exact_matches() {
        let r = resolver();
        let first = resolve(&r, "Jane Smith");
        assert_eq!(first.event, ResolutionEvent::Created);
        let again = resolve(&r, "Jane Smith");
        assert_eq!(again.representative_id, first.representative_id);
        assert_eq!(again.event, ResolutionEvent::Matched(MatchTier::Exact));
    }

    #[test]
    fn case_and_punctuation_variants_match_tier_two() {
        let r = resolver();
        let first = resolve(&r, "Jane Smith");
        let upper = resolve(&r, "JANE SMITH");
        assert_eq!(upper.representative_id, first.representative_id);
        assert_eq!(upper.event, ResolutionEvent::AliasAdded(MatchTier::CaseInsensitive));
    }

    #[test]
    fn initial_form_matches_by_containment() {
        let r = resolver();
        let jane = resolve(&r, "Jane Smith");
        resolve(&r, "Robert Doe");
        let short = resolve(&r, "J. Smith");
        assert_eq!(short.representative_id, jane.representative_id);
        assert_eq!(short.event, ResolutionEvent::AliasAdded(MatchTier::Containment));
        let rep = r.get(&jane.representative_id).unwrap().unwrap();
        assert!(rep.aliases.contains("J. Smith"));
        assert_eq!(rep.canonical_name, "Jane Smith");
    }

    #[test]
    fn ambiguous_containment_defers_to_fuzzy_then_conflict() {
        let r = resolver();
        resolve(&r, "Jane Smith");
        resolve(&r, "John Smith");
        let ambiguous = resolve(&r, "Smith");
        assert!(matches!(
            ambiguous.event,
            ResolutionEvent::Created | ResolutionEvent::CreatedAfterConflict { .. }
        ));
        assert_eq!(r.representatives().unwrap().len(), 3);
    }

    #[test]
    fn misspelling_matches_fuzzy_tier() {
        let r = resolver();
        let jane = resolve(&r, "Jane Smith");
        let typo = resolve(&r, "Jane Smyth");
        assert_eq!(typo.representative_id, jane.representative_id);
        assert_eq!(typo.event, ResolutionEvent::AliasAdded(MatchTier::Fuzzy));
        let rep = r.get(&jane.representative_id).unwrap().unwrap();
        assert!(rep.weak_aliases.contains("Jane Smyth"));
    }

    #[test]
    fn fuzzy_threshold_is_inclusive() {
        let r = table_resolver(vec![("alpha person", "alfa person", 0.9)]);
        let first = resolve(&r, "Alpha Person");
        let at = resolve(&r, "Alfa Person");
        assert_eq!(at.representative_id, first.representative_id);
        assert_eq!(at.event, ResolutionEvent::AliasAdded(MatchTier::Fuzzy));
    }

    #[test]
    fn fuzzy_score_below_threshold_is_rejected() {
        let r = table_resolver(vec![("alpha person", "alfa person", 0.89)]);
        let first = resolve(&r, "Alpha Person");
        let below = resolve(&r, "Alfa Person");
        assert_ne!(below.representative_id, first.representative_id);
        assert_eq!(below.event, ResolutionEvent::Created);
    }

    #[test]
    fn near_tie_is_a_conflict_not_a_guess() {
        let r = table_resolver(vec![
            ("pat smith", "pat smyth", 0.95),
            ("pat smith", "pat smithe", 0.94),
        ]);
        let a = resolve(&r, "Pat Smyth");
        let b = resolve(&r, "Pat Smithe");
        let c = resolve(&r, "Pat Smith");
        match c.event.conflict("Pat Smith") {
            Some(PipelineError::ResolverMergeConflict { name, candidates }) => {
                assert_eq!(name, "Pat Smith");
                assert!(candidates.contains(&a.representative_id));
                assert!(candidates.contains(&b.representative_id));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(a.event.conflict("Pat Smyth").is_none());
        let rep = r.get(&c.representative_id).unwrap().unwrap();
        assert!(rep.provisional);
    }

    #[test]
    fn district_hint_breaks_fuzzy_tie() {
        let r = table_resolver(vec![
            ("pat smith", "pat smyth", 0.95),
            ("pat smith", "pat smithe", 0.94),
        ]);
        let a = resolve(&r, "Pat Smyth, District 3");
        resolve(&r, "Pat Smithe, District 8");
        let c = r
            .resolve("Pat Smith", Some(&DistrictHint::soft("3")))
            .unwrap()
            .unwrap();
        assert_eq!(c.representative_id, a.representative_id);
    }

    #[test]
    fn strict_district_excludes_other_districts() {
        let r = resolver();
        let five = resolve(&r, "Jane Smith, District 5");
        let nine = resolve(&r, "Jane Smith, District 9");
        assert_ne!(nine.representative_id, five.representative_id);
        let rep = r.get(&nine.representative_id).unwrap().unwrap();
        assert!(rep.aliases.contains("Jane Smith (District 9)"));
        assert_eq!(rep.district.as_deref(), Some("9"));

        let again = resolve(&r, "Jane Smith, District 9");
        assert_eq!(again.representative_id, nine.representative_id);
        assert_eq!(again.event, ResolutionEvent::Matched(MatchTier::Exact));
    }

    #[test]
    fn provisional_identity_merges_once_district_disambiguates() {
        let r = resolver();
        let jane = resolve(&r, "Jane Smith, District 5");
        resolve(&r, "Jane Smith");
        let john = resolve(&r, "John Smith, District 9");
        resolve(&r, "John Smith");

        let provisional = resolve(&r, "J. Smith");
        assert!(matches!(
            provisional.event,
            ResolutionEvent::CreatedAfterConflict { .. }
        ));

        let later = resolve(&r, "J. Smith, District 5");
        assert_eq!(later.representative_id, jane.representative_id);
        assert_eq!(
            later.event,
            ResolutionEvent::Merged {
                tier: MatchTier::Exact,
                absorbed: provisional.representative_id.clone(),
            }
        );
        let merged = r.get(&provisional.representative_id).unwrap().unwrap();
        assert_eq!(merged.merged_into.as_deref(), Some(jane.representative_id.as_str()));
        assert!(merged.aliases.is_empty());
        let survivor = r.get(&jane.representative_id).unwrap().unwrap();
        assert!(survivor.aliases.contains("J. Smith"));
        assert_ne!(survivor.id, john.representative_id);
    }

    #[test]
    fn merge_direction_and_idempotence() {
        let r = resolver();
        let a = resolve(&r, "Alice Walker");
        let b = resolve(&r, "Bea Jones");
        resolve(&r, "Bea Jones");

        let first = r.merge(&a.representative_id, &b.representative_id).unwrap();
        assert_eq!(first.survivor, b.representative_id);
        assert_eq!(first.absorbed.as_deref(), Some(a.representative_id.as_str()));

        let second = r.merge(&a.representative_id, &b.representative_id).unwrap();
        assert_eq!(second.survivor, b.representative_id);
        assert_eq!(second.absorbed, None);

        let reps = r.representatives().unwrap();
        assert_eq!(reps.len(), 1);
        assert_eq!(reps[0].aliases.len(), 2);
        assert_eq!(reps[0].record_count, 3);
    }

    #[test]
    fn merge_tie_goes_to_earliest_identity() {
        let r = resolver();
        let a = resolve(&r, "Alice Walker");
        let b = resolve(&r, "Bea Jones");
        let outcome = r.merge(&b.representative_id, &a.representative_id).unwrap();
        assert_eq!(outcome.survivor, a.representative_id);
    }

    #[test]
    fn alias_sets_never_overlap() {
        let r = resolver();
        for name in [
            "Jane Smith",
            "J. Smith",
            "Jane Smith, District 5",
            "Jane Smith, District 9",
            "Robert Doe",
            "ROBERT DOE",
            "Bob Doe",
        ] {
            resolve(&r, name);
        }
        let mut seen = std::collections::HashSet::new();
        for rep in r.representatives().unwrap() {
            for alias in rep.aliases {
                assert!(seen.insert(alias.clone()), "alias {alias} owned twice");
            }
        }
    }

    #[test]
    fn placeholder_names_resolve_to_nothing() {
        let r = resolver();
        assert!(r.resolve("N/A", None).unwrap().is_none());
        assert!(r.resolve("   ", None).unwrap().is_none());
    }

    #[test]
    fn reloads_identities_from_store() {
        let store: Arc<dyn VotingStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let first = RepresentativeResolver::new(
            store.clone(),
            Box::new(JaroWinkler::default()),
            0.9,
            0.03,
        )
        .unwrap();
        let jane = first.resolve("Jane Smith", None).unwrap().unwrap();

        let second =
            RepresentativeResolver::new(store, Box::new(JaroWinkler::default()), 0.9, 0.03)
                .unwrap();
        let again = second.resolve("Jane Smith", None).unwrap().unwrap();
        assert_eq!(again.representative_id, jane.representative_id);
        let fresh = second.resolve("Robert Doe", None).unwrap().unwrap();
        assert_ne!(fresh.representative_id, jane.representative_id);
    }
}
