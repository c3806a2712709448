//! Cross-cutting properties of the layout algebra: permutation/carry coherence, slice
//! scenarios over heterogeneous trees, canonicalization idempotence, merge laws, and
//! identity propagation.

use ragged_array::{
    Content, Index64, Index8, IndexedOptionArray, ListOffsetArray, NumpyArray, RecordArray,
    Slice, SliceItem, SliceJagged64, Sum, UnionArray,
};
use ragged_buffer::buffer;
use rstest::rstest;

fn list_of_records() -> Content {
    // [[{x:1,y:10},{x:2,y:20}], [], [{x:3,y:30},{x:4,y:40},{x:5,y:50}]]
    let record = RecordArray::try_new(
        vec![
            NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
            NumpyArray::from_buffer(buffer![10i64, 20, 30, 40, 50]).into_ref(),
        ],
        Some(vec!["x".to_string(), "y".to_string()]),
        5,
    )
    .unwrap();
    ListOffsetArray::try_new(buffer![0i64, 2, 2, 5].into(), record.into_ref())
        .unwrap()
        .to_content()
}

fn jagged_numbers() -> Content {
    // [[10,20,30],[],[40,50]]
    ListOffsetArray::try_new(
        buffer![0i64, 3, 3, 5].into(),
        NumpyArray::from_buffer(buffer![10i64, 20, 30, 40, 50]).into_ref(),
    )
    .unwrap()
    .to_content()
}

fn option_of_option() -> IndexedOptionArray {
    IndexedOptionArray::try_new(
        Index64::from(vec![0i64, -1, 1]).into(),
        IndexedOptionArray::try_new(
            Index64::from(vec![-1i64, 2]).into(),
            NumpyArray::from_vec(vec![100i64, 200, 300]).into_ref(),
        )
        .unwrap()
        .into_ref(),
    )
    .unwrap()
}

#[rstest]
#[case::lists(jagged_numbers())]
#[case::records(list_of_records())]
#[case::options(option_of_option().to_content())]
fn carry_preserves_length_and_elements(#[case] layout: Content) {
    let idx = Index64::from(vec![2i64, 0, 1, 1]);
    let carried = layout.carry(&idx).unwrap();
    assert_eq!(carried.len(), idx.len());
    for (i, &j) in idx.as_slice().iter().enumerate() {
        assert_eq!(
            carried.getitem_at(i as i64).unwrap().to_json().unwrap(),
            layout.getitem_at(j).unwrap().to_json().unwrap(),
        );
    }
}

#[rstest]
#[case::lists(jagged_numbers())]
#[case::records(list_of_records())]
#[case::options(option_of_option().to_content())]
fn full_range_round_trips(#[case] layout: Content) {
    let all = layout.getitem_range(None, None).unwrap();
    assert_eq!(all.len(), layout.len());
    assert_eq!(
        all.to_json().unwrap().to_string(),
        layout.to_json().unwrap().to_string()
    );
}

#[test]
fn slice_through_list_of_records() {
    let out = list_of_records()
        .getitem(&Slice::new(vec![SliceItem::at(2), SliceItem::field("y")]).unwrap())
        .unwrap();
    assert_eq!(
        out.as_array().unwrap().to_json().unwrap().to_string(),
        "[30,40,50]"
    );
}

#[test]
fn field_first_then_element() {
    let out = list_of_records()
        .getitem(&Slice::new(vec![SliceItem::field("x"), SliceItem::at(0)]).unwrap())
        .unwrap();
    assert_eq!(
        out.as_array().unwrap().to_json().unwrap().to_string(),
        "[1,2]"
    );
}

#[test]
fn jagged_slice_scenario() {
    let jagged = SliceItem::Jagged64(
        SliceJagged64::try_new(
            Index64::from(vec![0i64, 2, 2, 3]),
            SliceItem::array(vec![0, 2, 0]),
        )
        .unwrap(),
    );
    let out = jagged_numbers()
        .getitem(&Slice::new(vec![jagged]).unwrap())
        .unwrap();
    assert_eq!(
        out.as_array().unwrap().to_json().unwrap().to_string(),
        "[[10,30],[],[40]]"
    );
}

#[test]
fn jagged_slice_with_missing_entries() {
    let inner = SliceItem::missing(&[Some(0), None, Some(0)]);
    let jagged = SliceItem::Jagged64(
        SliceJagged64::try_new(Index64::from(vec![0i64, 2, 2, 3]), inner).unwrap(),
    );
    let out = jagged_numbers()
        .getitem(&Slice::new(vec![jagged]).unwrap())
        .unwrap();
    assert_eq!(
        out.as_array().unwrap().to_json().unwrap().to_string(),
        "[[10,null],[],[40]]"
    );
}

#[test]
fn jagged_of_jagged_descends() {
    // [[[1,2],[3]],[],[[4],[5,6]]] sliced by [[[1],[0]],[],[[0],[]]]
    let inner = ListOffsetArray::try_new(
        buffer![0i64, 2, 3, 4, 6].into(),
        NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5, 6]).into_ref(),
    )
    .unwrap();
    let layout = ListOffsetArray::try_new(buffer![0i64, 2, 2, 4].into(), inner.into_ref())
        .unwrap()
        .to_content();
    let innermost = SliceItem::Jagged64(
        SliceJagged64::try_new(
            Index64::from(vec![0i64, 1, 2, 3, 3]),
            SliceItem::array(vec![1, 0, 0]),
        )
        .unwrap(),
    );
    let jagged = SliceItem::Jagged64(
        SliceJagged64::try_new(Index64::from(vec![0i64, 2, 2, 4]), innermost).unwrap(),
    );
    let out = layout.getitem(&Slice::new(vec![jagged]).unwrap()).unwrap();
    assert_eq!(
        out.as_array().unwrap().to_json().unwrap().to_string(),
        "[[[2],[3]],[],[[4],[]]]"
    );
}

#[test]
fn option_collapse_is_idempotent() {
    let once = option_of_option().simplify_optiontype().unwrap();
    let Content::IndexedOption(first) = once.as_ref() else {
        panic!("expected one option layer");
    };
    assert_eq!(first.index().to64().as_slice(), &[-1, -1, 2]);
    let twice = first.simplify_optiontype().unwrap();
    let Content::IndexedOption(second) = twice.as_ref() else {
        panic!("expected one option layer");
    };
    assert_eq!(first.index().to64().as_slice(), second.index().to64().as_slice());
}

#[test]
fn union_collapse_is_idempotent() {
    let union = UnionArray::try_new(
        Index8::new(buffer![0i8, 1, 0, 1]).into(),
        Index64::from(vec![0i64, 0, 1, 1]).into(),
        vec![
            NumpyArray::from_vec(vec![1i64, 2]).into_ref(),
            NumpyArray::from_vec(vec![3.0f64, 4.0]).into_ref(),
        ],
    )
    .unwrap();
    let once = union.simplify_uniontype(false).unwrap();
    let twice = once.simplify_uniontype(false).unwrap();
    assert_eq!(
        once.to_json().unwrap().to_string(),
        twice.to_json().unwrap().to_string()
    );
    assert_eq!(once.to_json().unwrap().to_string(), "[1.0,3.0,2.0,4.0]");
}

#[test]
fn merge_is_associative_elementwise() {
    let a = jagged_numbers();
    let b = ListOffsetArray::try_new(
        buffer![0i64, 1].into(),
        NumpyArray::from_buffer(buffer![60i64]).into_ref(),
    )
    .unwrap()
    .to_content();
    let c = ListOffsetArray::try_new(
        buffer![0i64, 0, 2].into(),
        NumpyArray::from_buffer(buffer![70i64, 80]).into_ref(),
    )
    .unwrap()
    .to_content();
    let left = a.merge(&b).unwrap().merge(&c).unwrap();
    let right = a.merge(&b.merge(&c).unwrap()).unwrap();
    assert_eq!(left.len(), 6);
    assert_eq!(
        left.to_json().unwrap().to_string(),
        right.to_json().unwrap().to_string()
    );
    assert_eq!(
        left.to_json().unwrap().to_string(),
        "[[10,20,30],[],[40,50],[60],[],[70,80]]"
    );
}

#[test]
fn merge_of_records_is_fieldwise() {
    let a = RecordArray::try_new(
        vec![
            NumpyArray::from_vec(vec![1i64, 2]).into_ref(),
            NumpyArray::from_vec(vec![3i64, 4]).into_ref(),
        ],
        Some(vec!["a".to_string(), "b".to_string()]),
        2,
    )
    .unwrap()
    .to_content();
    let b = RecordArray::try_new(
        vec![
            NumpyArray::from_vec(vec![5i64]).into_ref(),
            NumpyArray::from_vec(vec![6i64]).into_ref(),
        ],
        Some(vec!["a".to_string(), "b".to_string()]),
        1,
    )
    .unwrap()
    .to_content();
    let merged = a.merge(&b).unwrap();
    assert_eq!(
        merged.to_json().unwrap().to_string(),
        r#"[{"a":1,"b":3},{"a":2,"b":4},{"a":5,"b":6}]"#
    );
}

#[test]
fn mismatched_record_fields_do_not_merge() {
    let a = RecordArray::try_new(
        vec![NumpyArray::from_vec(vec![1i64]).into_ref()],
        Some(vec!["a".to_string()]),
        1,
    )
    .unwrap()
    .to_content();
    let b = RecordArray::try_new(
        vec![NumpyArray::from_vec(vec![2i64]).into_ref()],
        Some(vec!["z".to_string()]),
        1,
    )
    .unwrap()
    .to_content();
    assert!(!a.mergeable(&b, false));
    assert!(a.merge(&b).is_err());
}

#[test]
fn pad_scenario() {
    let layout = ListOffsetArray::try_new(
        buffer![0i64, 2, 5, 5].into(),
        NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
    )
    .unwrap()
    .to_content();
    let padded = layout.pad(3, 1).unwrap();
    assert_eq!(
        padded.to_json().unwrap().to_string(),
        "[[1,2,null],[3,4,5],[null,null,null]]"
    );
    let clipped = layout.pad_and_clip(2, 1).unwrap();
    assert_eq!(
        clipped.to_json().unwrap().to_string(),
        "[[1,2],[3,4],[null,null]]"
    );
}

#[test]
fn json_round_trip_for_leaf_only_trees() {
    let layout = list_of_records();
    let json = layout.to_json().unwrap();
    let reparsed: serde_json::Value =
        serde_json::from_str(&json.to_string()).unwrap();
    assert_eq!(json, reparsed);
}

#[test]
fn identities_follow_the_path() {
    let layout = jagged_numbers().assign_identities().unwrap();
    let Content::ListOffset(list) = &layout else {
        panic!("expected a list layer");
    };
    let child_ids = list.content().identities().expect("child identities derived");
    // element 3 of the flat content is row 2, position 0
    assert_eq!(child_ids.row(3), &[2, 0]);
    assert_eq!(child_ids.row(1), &[0, 1]);
    // slicing keeps identity rows aligned with the surviving elements
    let sliced = layout.getitem_range(Some(1), None).unwrap();
    assert_eq!(sliced.identities().expect("sliced identities").row(0), &[1]);
}

#[test]
fn identities_extend_through_records() {
    let layout = list_of_records().assign_identities().unwrap();
    let Content::ListOffset(list) = &layout else {
        panic!("expected a list layer");
    };
    let Content::Record(record) = list.content().as_ref() else {
        panic!("expected a record layer");
    };
    let x_ids = record.field("x").unwrap().identities().expect("field identities");
    assert_eq!(x_ids.field_loc(), &vec![(2, "x".to_string())]);
    assert_eq!(x_ids.row(4), &[2, 2]);
    assert_eq!(x_ids.location_at(4), "2,2,\"x\"");
}

#[test]
fn validity_errors_name_the_path() {
    let bad = ListOffsetArray::try_new(
        buffer![0i64, 3, 2].into(),
        NumpyArray::from_buffer(buffer![1i64, 2, 3]).into_ref(),
    )
    .unwrap()
    .to_content();
    let message = bad.validity_error("layout").unwrap();
    assert!(message.contains("layout"), "got {message}");
    assert!(message.contains("monoton"), "got {message}");

    let nested = ListOffsetArray::try_new(buffer![0i64, 1].into(), bad.into())
        .unwrap()
        .to_content();
    let message = nested.validity_error("layout").unwrap();
    assert!(message.contains("layout.content"), "got {message}");
}

#[test]
fn union_of_one_branch_simplifies_to_carry() {
    let union = UnionArray::try_new(
        Index8::new(buffer![0i8, 0]).into(),
        Index64::from(vec![1i64, 0]).into(),
        vec![NumpyArray::from_vec(vec![7i64, 8]).into_ref()],
    )
    .unwrap();
    let out = union.simplify_uniontype(false).unwrap();
    assert_eq!(out.to_json().unwrap().to_string(), "[8,7]");
}

#[test]
fn reduce_through_nesting() {
    let layout = jagged_numbers();
    let sums = layout.reduce(&Sum, 1, false, false).unwrap();
    assert_eq!(
        sums.as_array().unwrap().to_json().unwrap().to_string(),
        "[60,0,90]"
    );
    let total = layout.flatten(1).unwrap().reduce(&Sum, 0, false, false).unwrap();
    assert_eq!(total.as_scalar().unwrap().as_i64().unwrap(), 150);
}

#[test]
fn deep_copy_preserves_structure() {
    let layout = list_of_records();
    let copied = layout.deep_copy(true, true, true).unwrap();
    assert_eq!(
        layout.to_json().unwrap().to_string(),
        copied.to_json().unwrap().to_string()
    );
}

#[test]
fn fillna_broadcasts_a_single_value() {
    let option = option_of_option().simplify_optiontype().unwrap();
    let filled = option
        .fillna(&NumpyArray::from_vec(vec![0i64]).into_ref())
        .unwrap();
    assert_eq!(filled.to_json().unwrap().to_string(), "[0,0,300]");
    let too_long = option.fillna(&NumpyArray::from_vec(vec![0i64, 1]).into_ref());
    assert!(too_long.is_err());
}

#[test]
fn combinations_pairs_rowwise() {
    let layout = jagged_numbers();
    let pairs = layout
        .combinations(2, false, None, &Default::default(), 1)
        .unwrap();
    assert_eq!(
        pairs.to_json().unwrap().to_string(),
        r#"[[{"0":10,"1":20},{"0":10,"1":30},{"0":20,"1":30}],[],[{"0":40,"1":50}]]"#
    );
}

#[test]
fn local_index_levels() {
    let layout = jagged_numbers();
    assert_eq!(
        layout.local_index(0).unwrap().to_json().unwrap().to_string(),
        "[0,1,2]"
    );
    assert_eq!(
        layout.local_index(1).unwrap().to_json().unwrap().to_string(),
        "[[0,1,2],[],[0,1]]"
    );
}
