use testing::smoke;

#[tokio::test]
#[ignore = "needs the application running on SMOKE_BASE_URL"]
async fn test_home_page_title() {
    testing::init_tracing();
    let url = smoke::base_url();
    smoke::expect_title(&url, "React App").await.unwrap();
}
