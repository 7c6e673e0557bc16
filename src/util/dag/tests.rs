use crate::util::dag::{Dag, Error};

#[test]
fn test_add_vertex() {
    let dag = Dag::new();
    assert!(dag.add_vertex("a", 1).is_ok());
    assert_eq!(dag.add_vertex("a", 2), Err(Error::VertexAlreadyExists));
    assert_eq!(dag.len_vertex(), 1);
}

#[test]
fn test_add_then_delete_vertex_restores() {
    let dag = Dag::new();
    dag.add_vertex("a", ()).unwrap();
    dag.delete_vertex("a");
    assert_eq!(dag.get_vertex("a").unwrap_err(), Error::VertexNotFound);
    assert_eq!(dag.len_vertex(), 0);

    // 删除不存在的顶点不报错
    dag.delete_vertex("a");
}

#[test]
fn test_get_vertex() {
    let dag = Dag::new();
    dag.add_vertex("a", 7).unwrap();
    assert_eq!(dag.get_vertex("a").unwrap().value, 7);
    assert_eq!(dag.get_vertex("b").unwrap_err(), Error::VertexNotFound);
}

#[test]
fn test_range_vertex_short_circuit() {
    let dag = Dag::new();
    for id in ["a", "b", "c", "d"] {
        dag.add_vertex(id, ()).unwrap();
    }

    let mut seen = 0;
    dag.range_vertex(|_, _| {
        seen += 1;
        seen < 2
    });
    assert_eq!(seen, 2);
}

#[test]
fn test_add_edge_self_loop() {
    let dag = Dag::new();
    dag.add_vertex("a", ()).unwrap();
    assert_eq!(dag.add_edge("a", "a"), Err(Error::CycleBetweenVertices));
}

#[test]
fn test_add_edge_vertex_not_found() {
    let dag = Dag::new();
    dag.add_vertex("a", ()).unwrap();
    assert_eq!(dag.add_edge("a", "b"), Err(Error::VertexNotFound));
    assert_eq!(dag.add_edge("b", "a"), Err(Error::VertexNotFound));
}

#[test]
fn test_add_edge_duplicate_reports_cycle() {
    let dag = Dag::new();
    dag.add_vertex("a", ()).unwrap();
    dag.add_vertex("b", ()).unwrap();
    dag.add_edge("a", "b").unwrap();

    // 重复的直连边按环处理，沿用既有对外语义
    assert_eq!(dag.add_edge("a", "b"), Err(Error::CycleBetweenVertices));
}

#[test]
fn test_add_edge_cycle_length_two() {
    let dag = Dag::new();
    dag.add_vertex("a", ()).unwrap();
    dag.add_vertex("b", ()).unwrap();
    dag.add_edge("a", "b").unwrap();
    assert_eq!(dag.add_edge("b", "a"), Err(Error::CycleBetweenVertices));
}

#[test]
fn test_add_edge_cycle_length_three() {
    let dag = Dag::new();
    for id in ["a", "b", "c"] {
        dag.add_vertex(id, ()).unwrap();
    }
    dag.add_edge("a", "b").unwrap();
    dag.add_edge("b", "c").unwrap();
    assert_eq!(dag.add_edge("c", "a"), Err(Error::CycleBetweenVertices));

    // 失败的插入不应留下半条边，已有的两条边原样保留
    let a = dag.get_vertex("a").unwrap();
    let b = dag.get_vertex("b").unwrap();
    let c = dag.get_vertex("c").unwrap();
    assert_eq!(a.parents.len(), 0);
    assert_eq!(c.children.len(), 0);
    assert_eq!(a.children.len(), 1);
    assert_eq!(b.children.len(), 1);
    assert_eq!(c.parents.len(), 1);
}

#[test]
fn test_add_then_delete_edge_restores() {
    let dag = Dag::new();
    dag.add_vertex("a", ()).unwrap();
    dag.add_vertex("b", ()).unwrap();
    dag.add_edge("a", "b").unwrap();
    dag.delete_edge("a", "b").unwrap();

    let a = dag.get_vertex("a").unwrap();
    let b = dag.get_vertex("b").unwrap();
    assert_eq!(a.children.len(), 0);
    assert_eq!(b.parents.len(), 0);

    // 反向边现在可以加上了
    dag.add_edge("b", "a").unwrap();
}

#[test]
fn test_delete_edge_vertex_not_found() {
    let dag = Dag::new();
    dag.add_vertex("a", ()).unwrap();
    assert_eq!(dag.delete_edge("a", "b"), Err(Error::VertexNotFound));
}

#[test]
fn test_delete_middle_vertex_detaches_chain() {
    let dag = Dag::new();
    for id in ["a", "b", "c"] {
        dag.add_vertex(id, ()).unwrap();
    }
    dag.add_edge("a", "b").unwrap();
    dag.add_edge("b", "c").unwrap();

    dag.delete_vertex("b");

    let a = dag.get_vertex("a").unwrap();
    let c = dag.get_vertex("c").unwrap();
    assert_eq!(a.children.len(), 0);
    assert_eq!(c.parents.len(), 0);
    assert_eq!(dag.get_vertex("b").unwrap_err(), Error::VertexNotFound);
}

#[test]
fn test_diamond_is_not_cycle() {
    let dag = Dag::new();
    for id in ["a", "b", "c", "d"] {
        dag.add_vertex(id, ()).unwrap();
    }
    dag.add_edge("a", "b").unwrap();
    dag.add_edge("a", "c").unwrap();
    dag.add_edge("b", "d").unwrap();
    dag.add_edge("c", "d").unwrap();

    let d = dag.get_vertex("d").unwrap();
    assert_eq!(d.parents.len(), 2);
}
