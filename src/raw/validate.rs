use super::{Layout, load};
use crate::aggregate::Aggregate;
use crate::error::{Error, Result, ViolationKind};
use crate::node::{Node, NodeId};
use crate::store::NodeStore;
use crate::value::Key;

/// Relative tolerance for stored sums. Aggregates are maintained by repeated
/// float additions and subtractions, so a stored sum may differ from a fresh
/// recomputation in the last bits.
const SUM_TOLERANCE: f64 = 1e-9;

/// What a validated subtree reports to its parent.
struct Subtree {
    height: usize,
    aggregate: Aggregate,
    min: Option<Key>,
    max: Option<Key>,
}

/// Walks the whole tree below `root` and fails with the first broken
/// invariant found.
pub(crate) fn validate<S: NodeStore + ?Sized>(store: &S, layout: Layout, root: NodeId) -> Result<()> {
    check(store, layout, root, true).map(|_| ())
}

fn violation(kind: ViolationKind, node: NodeId, detail: String) -> Error {
    Error::InvariantViolation { kind, node, detail }
}

fn check<S: NodeStore + ?Sized>(store: &S, layout: Layout, id: NodeId, is_root: bool) -> Result<Subtree> {
    let node = load(store, id)?;
    check_shape(layout, id, &node, is_root)?;

    let mut height = None;
    let mut aggregate = node.items_aggregate();
    let mut min = node.items.first().map(|item| item.key.clone());
    let mut max = node.items.last().map(|item| item.key.clone());

    for (i, &child_id) in node.children.iter().enumerate() {
        let child = check(store, layout, child_id, false)?;

        match height {
            None => height = Some(child.height),
            Some(expected) if expected != child.height => {
                return Err(violation(
                    ViolationKind::HeightMismatch,
                    id,
                    format!("child {i} has height {} but child 0 has height {expected}", child.height),
                ));
            }
            Some(_) => {}
        }

        if let (Some(separator), Some(child_max)) = (node.items.get(i), &child.max)
            && *child_max >= separator.key
        {
            return Err(violation(
                ViolationKind::KeyRange,
                id,
                format!("child {i} holds {child_max}, not below separator {}", separator.key),
            ));
        }
        if let (Some(separator), Some(child_min)) = (i.checked_sub(1).and_then(|j| node.items.get(j)), &child.min)
            && *child_min <= separator.key
        {
            return Err(violation(
                ViolationKind::KeyRange,
                id,
                format!("child {i} holds {child_min}, not above separator {}", separator.key),
            ));
        }

        if i == 0 {
            min = child.min.or(min);
        }
        if i + 1 == node.children.len() {
            max = child.max.or(max);
        }
        aggregate += child.aggregate;
    }

    if node.aggregate.count != aggregate.count {
        return Err(violation(
            ViolationKind::CountMismatch,
            id,
            format!("stored {} but subtree holds {}", node.aggregate.count, aggregate.count),
        ));
    }
    if !sums_agree(node.aggregate.sum, aggregate.sum) {
        return Err(violation(
            ViolationKind::SumMismatch,
            id,
            format!("stored {} but subtree sums to {}", node.aggregate.sum, aggregate.sum),
        ));
    }

    Ok(Subtree {
        height: height.map_or(0, |h| h + 1),
        // Later checks compare against what is stored, which is what callers read.
        aggregate: node.aggregate,
        min,
        max,
    })
}

/// Checks everything about a node that needs no other node.
fn check_shape(layout: Layout, id: NodeId, node: &Node, is_root: bool) -> Result<()> {
    let items = node.items.len();
    if items > layout.max {
        return Err(violation(
            ViolationKind::Oversized,
            id,
            format!("{items} items, max {}", layout.max),
        ));
    }
    if !node.is_leaf() && items == 0 {
        return Err(violation(
            ViolationKind::EmptyInternal,
            id,
            format!("{} children and no items", node.children.len()),
        ));
    }
    if !is_root && items < layout.min {
        return Err(violation(
            ViolationKind::Undersized,
            id,
            format!("{items} items, min {}", layout.min),
        ));
    }
    if !node.is_leaf() && node.children.len() != items + 1 {
        return Err(violation(
            ViolationKind::ChildCountMismatch,
            id,
            format!("{items} items but {} children", node.children.len()),
        ));
    }
    if let Some(i) = node.items.windows(2).position(|pair| pair[0].key >= pair[1].key) {
        return Err(violation(
            ViolationKind::Unsorted,
            id,
            format!("items {i} ({}) and {} ({})", node.items[i].key, i + 1, node.items[i + 1].key),
        ));
    }
    Ok(())
}

#[allow(clippy::float_cmp)]
fn sums_agree(stored: f64, computed: f64) -> bool {
    // Infinities only ever equal themselves; their difference is NaN.
    if stored == computed || (stored.is_nan() && computed.is_nan()) {
        return true;
    }
    (stored - computed).abs() <= SUM_TOLERANCE * stored.abs().max(computed.abs()).max(1.0)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::node::{Item, NodePatch};
    use crate::raw::test_support::Fixture;
    use smallvec::smallvec;

    // ─── Helpers ─────────────────────────────────────────────────────────────

    /// Root [2], left [0, 1], right [3, 4] with summand == key.
    fn two_level() -> Fixture {
        let mut fixture = Fixture::new(4);
        for key in 0..5 {
            fixture.insert(f64::from(key), f64::from(key));
        }
        fixture.validate();
        fixture
    }

    fn kind_of(fixture: &Fixture) -> ViolationKind {
        match validate(&fixture.store, fixture.layout, fixture.root) {
            Err(Error::InvariantViolation { kind, .. }) => kind,
            other => panic!("expected an invariant violation, got {other:?}"),
        }
    }

    fn child(fixture: &Fixture, i: usize) -> NodeId {
        load(&fixture.store, fixture.root).unwrap().children[i]
    }

    fn item(key: f64) -> Item {
        Item::new(key, "x", key)
    }

    // ─── Tests ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_and_filled_trees_pass() {
        Fixture::new(4).validate();
        let mut fixture = Fixture::new(6);
        for key in 0..500 {
            fixture.insert(f64::from((key * 7919) % 500), 0.25);
        }
        fixture.validate();
    }

    #[test]
    fn detects_oversized() {
        let mut fixture = Fixture::new(4);
        let items = (0..5).map(|k| item(f64::from(k))).collect();
        let patch = NodePatch::new().items(items).aggregate(Aggregate::new(5, 10.0));
        fixture.store.overwrite_node(fixture.root, patch).unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::Oversized);
    }

    #[test]
    fn detects_undersized() {
        let mut fixture = two_level();
        let left = child(&fixture, 0);
        let patch = NodePatch::new().items(smallvec![item(0.0)]).aggregate(Aggregate::new(1, 0.0));
        fixture.store.overwrite_node(left, patch).unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::Undersized);
    }

    #[test]
    fn detects_child_count_mismatch() {
        let mut fixture = two_level();
        let extra = child(&fixture, 1);
        let left = child(&fixture, 0);
        fixture
            .store
            .overwrite_node(fixture.root, NodePatch::new().children(smallvec![left, extra, extra]))
            .unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::ChildCountMismatch);
    }

    #[test]
    fn detects_empty_internal() {
        let mut fixture = two_level();
        fixture
            .store
            .overwrite_node(fixture.root, NodePatch::new().items(smallvec![]))
            .unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::EmptyInternal);
    }

    #[test]
    fn detects_unsorted() {
        let mut fixture = two_level();
        let right = child(&fixture, 1);
        fixture
            .store
            .overwrite_node(right, NodePatch::new().items(smallvec![item(4.0), item(3.0)]))
            .unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::Unsorted);
    }

    #[test]
    fn detects_key_range() {
        let mut fixture = two_level();
        let right = child(&fixture, 1);
        fixture
            .store
            .overwrite_node(right, NodePatch::new().items(smallvec![item(1.5), item(3.0)]))
            .unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::KeyRange);
    }

    #[test]
    fn detects_count_and_sum_mismatch() {
        let mut fixture = two_level();
        fixture
            .store
            .overwrite_node(fixture.root, NodePatch::new().aggregate(Aggregate::new(6, 10.0)))
            .unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::CountMismatch);

        fixture
            .store
            .overwrite_node(fixture.root, NodePatch::new().aggregate(Aggregate::new(5, 11.0)))
            .unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::SumMismatch);
    }

    #[test]
    fn unequal_leaf_depths_are_a_height_mismatch() {
        let mut fixture = Fixture::new(4);
        for key in 0..30 {
            fixture.insert(f64::from(key), f64::from(key));
        }
        // Root has internal children; swap one for a leaf of the right key range.
        let root = load(&fixture.store, fixture.root).unwrap();
        assert!(!load(&fixture.store, root.children[0]).unwrap().is_leaf());
        let lo = root.items[0].key.clone();
        let Key::Float64(lo) = lo else { panic!("float keys only") };
        let leaf = fixture
            .store
            .create_node(Node {
                items: smallvec![item(lo + 0.25), item(lo + 0.5)],
                children: smallvec![],
                aggregate: Aggregate::new(2, lo * 2.0 + 0.75),
            })
            .unwrap();
        let mut children = root.children.clone();
        let old = children[1];
        children[1] = leaf;
        let old_aggregate = load(&fixture.store, old).unwrap().aggregate;
        let aggregate = root.aggregate - old_aggregate + Aggregate::new(2, lo * 2.0 + 0.75);
        fixture
            .store
            .overwrite_node(fixture.root, NodePatch::new().children(children).aggregate(aggregate))
            .unwrap();
        assert_eq!(kind_of(&fixture), ViolationKind::HeightMismatch);
    }

    #[test]
    fn tiny_float_drift_is_tolerated() {
        assert!(sums_agree(0.1 + 0.2, 0.3));
        assert!(sums_agree(1e12 + 0.0001, 1e12));
        assert!(!sums_agree(1.0, 1.001));
    }

    #[test]
    fn non_finite_sums_agree_with_themselves() {
        assert!(sums_agree(f64::INFINITY, f64::INFINITY));
        assert!(sums_agree(f64::NEG_INFINITY, f64::NEG_INFINITY));
        assert!(sums_agree(f64::NAN, f64::NAN));
        assert!(!sums_agree(f64::INFINITY, f64::NEG_INFINITY));
        assert!(!sums_agree(f64::INFINITY, 1.0));
        assert!(!sums_agree(f64::NAN, 1.0));
    }

    #[test]
    fn infinite_summands_validate() {
        let mut fixture = Fixture::new(4);
        fixture.insert(1.0, f64::INFINITY);
        fixture.validate();
        for key in 2..12 {
            fixture.insert(f64::from(key), f64::from(key));
            fixture.validate();
        }
        fixture.insert(-5.0, f64::NEG_INFINITY);
        fixture.validate();
    }
}
