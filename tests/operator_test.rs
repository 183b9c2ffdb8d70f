use std::sync::Arc;

use tiny_db::{
    catalog::Table,
    operator::{
        Aggregate, AggregateOp, Delete, Filter, Insert, Join, JoinPredicate, OpIterator, OrderBy,
        ScanDirection,
    },
    small_int_schema,
    transaction::Transaction,
    Cell, Database, HeapTable, Op, Predicate, Tuple,
};

mod test_utils;
use test_utils::{new_sequential_btree_table, setup, unique_db_path, TreeLayout};

/// A heap table with the given rows, registered in the catalog.
fn heap_table_with_rows(name: &str, rows: &[Vec<i32>]) -> Arc<HeapTable> {
    let columns = rows.first().map(|r| r.len()).unwrap_or(1);
    let schema = small_int_schema(columns, "");
    let table = Arc::new(HeapTable::new(unique_db_path(name), &schema).unwrap());
    Database::mut_catalog().add_table(Table::Heap(Arc::clone(&table)), name, "");

    let tx = Transaction::new();
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(|v| Cell::Int32(*v)).collect();
        table.insert_tuple(&tx, &Tuple::new_from_cells(&cells)).unwrap();
    }
    tx.commit().unwrap();

    table
}

fn scan(tx: &Transaction, table_id: u32) -> Box<dyn OpIterator> {
    Box::new(tiny_db::operator::SeqScan::new(tx, table_id).unwrap())
}

#[test]
fn test_seq_scan_operator() {
    let _ctx = setup();

    let table = heap_table_with_rows("scan", &[vec![1, 10], vec![2, 20], vec![3, 30]]);
    let tx = Transaction::new();

    let mut scan = scan(&tx, table.get_id());

    // pulling before open is refused
    assert!(scan.next().is_err());

    scan.open().unwrap();
    let mut seen = Vec::new();
    while scan.has_next().unwrap() {
        seen.push(scan.next().unwrap().get_cell(0).get_int32());
    }
    assert_eq!(seen, vec![1, 2, 3]);

    // rewind restarts the stream
    scan.rewind().unwrap();
    assert!(scan.has_next().unwrap());
    assert_eq!(scan.next().unwrap().get_cell(0).get_int32(), 1);

    scan.close().unwrap();
    assert!(scan.next().is_err());

    tx.commit().unwrap();
}

#[test]
fn test_seq_scan_over_btree() {
    let _ctx = setup();

    let table = new_sequential_btree_table(2, 800, 0, TreeLayout::LastTwoEvenlyDistributed);
    let tx = Transaction::new();

    let mut scan = scan(&tx, table.get_id());
    scan.open().unwrap();

    let mut expected = 0;
    while scan.has_next().unwrap() {
        assert_eq!(scan.next().unwrap().get_cell(0).get_int32(), expected);
        expected += 1;
    }
    assert_eq!(expected, 800);

    scan.close().unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_index_scan_operator() {
    let _ctx = setup();

    let table = new_sequential_btree_table(2, 800, 0, TreeLayout::LastTwoEvenlyDistributed);
    let tx = Transaction::new();

    let predicate = Predicate::new(0, Op::GreaterThanOrEq, &Cell::Int32(795));
    let mut forward = tiny_db::operator::IndexScan::new(
        &tx,
        &table,
        &predicate,
        ScanDirection::Forward,
    )
    .unwrap();
    forward.open().unwrap();
    let mut seen = Vec::new();
    while forward.has_next().unwrap() {
        seen.push(forward.next().unwrap().get_cell(0).get_int32());
    }
    assert_eq!(seen, vec![795, 796, 797, 798, 799]);
    forward.close().unwrap();

    let predicate = Predicate::new(0, Op::LessThanOrEq, &Cell::Int32(4));
    let mut reverse = tiny_db::operator::IndexScan::new(
        &tx,
        &table,
        &predicate,
        ScanDirection::Reverse,
    )
    .unwrap();
    reverse.open().unwrap();
    let mut seen = Vec::new();
    while reverse.has_next().unwrap() {
        seen.push(reverse.next().unwrap().get_cell(0).get_int32());
    }
    assert_eq!(seen, vec![4, 3, 2, 1, 0]);
    reverse.close().unwrap();

    tx.commit().unwrap();
}

#[test]
fn test_filter_operator() {
    let _ctx = setup();

    let rows: Vec<Vec<i32>> = (0..100).map(|i| vec![i, i * 2]).collect();
    let table = heap_table_with_rows("filter", &rows);
    let tx = Transaction::new();

    let predicate = Predicate::new(0, Op::GreaterThanOrEq, &Cell::Int32(90));
    let mut filter = Filter::new(predicate, scan(&tx, table.get_id()));

    filter.open().unwrap();
    let mut count = 0;
    while filter.has_next().unwrap() {
        let t = filter.next().unwrap();
        assert!(t.get_cell(0).get_int32() >= 90);
        count += 1;
    }
    assert_eq!(count, 10);

    filter.close().unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_join_operator() {
    let _ctx = setup();

    let left = heap_table_with_rows(
        "join_left",
        &[vec![1, 100], vec![2, 200], vec![3, 300], vec![5, 500]],
    );
    let right = heap_table_with_rows(
        "join_right",
        &[vec![1, 11], vec![2, 22], vec![4, 44], vec![2, 23]],
    );
    let tx = Transaction::new();

    let predicate = JoinPredicate::new(0, Op::Equals, 0);
    let mut join = Join::new(
        predicate,
        scan(&tx, left.get_id()),
        scan(&tx, right.get_id()),
    );
    assert_eq!(join.get_schema().fields_count(), 4);

    join.open().unwrap();
    let mut merged = Vec::new();
    while join.has_next().unwrap() {
        let t = join.next().unwrap();
        merged.push((
            t.get_cell(0).get_int32(),
            t.get_cell(1).get_int32(),
            t.get_cell(3).get_int32(),
        ));
    }
    assert_eq!(merged, vec![(1, 100, 11), (2, 200, 22), (2, 200, 23)]);

    join.close().unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_aggregate_operator() {
    let _ctx = setup();

    // two groups: group 1 holds {10, 20, 30}, group 2 holds {5, 7}
    let rows = vec![
        vec![1, 10],
        vec![1, 20],
        vec![2, 5],
        vec![1, 30],
        vec![2, 7],
    ];
    let table = heap_table_with_rows("agg", &rows);
    let tx = Transaction::new();

    let cases = vec![
        (AggregateOp::Min, vec![(1, 10), (2, 5)]),
        (AggregateOp::Max, vec![(1, 30), (2, 7)]),
        (AggregateOp::Sum, vec![(1, 60), (2, 12)]),
        (AggregateOp::Avg, vec![(1, 20), (2, 6)]),
        (AggregateOp::Count, vec![(1, 3), (2, 2)]),
    ];

    for (op, expected) in cases {
        let mut agg = Aggregate::new(scan(&tx, table.get_id()), 1, Some(0), op).unwrap();
        agg.open().unwrap();

        let mut seen = Vec::new();
        while agg.has_next().unwrap() {
            let t = agg.next().unwrap();
            seen.push((t.get_cell(0).get_int32(), t.get_cell(1).get_int32()));
        }
        seen.sort();
        assert_eq!(seen, expected, "op: {:?}", op);

        agg.close().unwrap();
    }

    // no grouping: a single result tuple
    let mut agg = Aggregate::new(scan(&tx, table.get_id()), 1, None, AggregateOp::Sum).unwrap();
    agg.open().unwrap();
    assert!(agg.has_next().unwrap());
    let t = agg.next().unwrap();
    assert_eq!(t.get_cell(0).get_int32(), 72);
    assert!(!agg.has_next().unwrap());
    agg.close().unwrap();

    tx.commit().unwrap();
}

#[test]
fn test_order_by_operator() {
    let _ctx = setup();

    let rows = vec![vec![3, 1], vec![1, 2], vec![2, 3]];
    let table = heap_table_with_rows("order", &rows);
    let tx = Transaction::new();

    let mut asc = OrderBy::new(scan(&tx, table.get_id()), 0, true).unwrap();
    asc.open().unwrap();
    let mut seen = Vec::new();
    while asc.has_next().unwrap() {
        seen.push(asc.next().unwrap().get_cell(0).get_int32());
    }
    assert_eq!(seen, vec![1, 2, 3]);
    asc.close().unwrap();

    let mut desc = OrderBy::new(scan(&tx, table.get_id()), 0, false).unwrap();
    desc.open().unwrap();
    let mut seen = Vec::new();
    while desc.has_next().unwrap() {
        seen.push(desc.next().unwrap().get_cell(0).get_int32());
    }
    assert_eq!(seen, vec![3, 2, 1]);
    desc.close().unwrap();

    // a field outside the child schema is rejected up front
    assert!(OrderBy::new(scan(&tx, table.get_id()), 9, true).is_err());

    tx.commit().unwrap();
}

#[test]
fn test_insert_and_delete_operators() {
    let _ctx = setup();

    let source = heap_table_with_rows(
        "ins_src",
        &[vec![1, 1], vec![2, 2], vec![3, 3]],
    );
    let target = heap_table_with_rows("ins_dst", &[vec![9, 9]]);
    let tx = Transaction::new();

    // insert emits the count exactly once
    let mut insert = Insert::new(&tx, target.get_id(), scan(&tx, source.get_id())).unwrap();
    insert.open().unwrap();
    assert!(insert.has_next().unwrap());
    assert_eq!(insert.next().unwrap().get_cell(0).get_int32(), 3);
    assert!(!insert.has_next().unwrap());
    assert!(insert.next().is_err());
    insert.close().unwrap();

    assert_eq!(target.iterator(&tx).count(), 4);

    // delete the tuples matching a predicate, again with a single count
    // tuple
    let predicate = Predicate::new(0, Op::LessThanOrEq, &Cell::Int32(2));
    let filtered = Box::new(Filter::new(predicate, scan(&tx, target.get_id())));
    let mut delete = Delete::new(&tx, filtered);
    delete.open().unwrap();
    assert_eq!(delete.next().unwrap().get_cell(0).get_int32(), 2);
    assert!(!delete.has_next().unwrap());
    delete.close().unwrap();

    assert_eq!(target.iterator(&tx).count(), 2);

    tx.commit().unwrap();
}
